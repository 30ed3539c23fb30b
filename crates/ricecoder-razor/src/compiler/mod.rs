//! Compilation of generated program source
//!
//! [`CompilationUnitBuilder`] assembles a [`CompilationUnit`] with the fixed
//! reference set for a contract and hands it to a [`Toolchain`]. The bundled
//! [`ProgramToolchain`] checks the program against the references and emits
//! an image the [`ImageLoader`](crate::loader::ImageLoader) understands.

pub mod image;
pub mod syntax;
mod toolchain;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    contract::BaseKind,
    diagnostics::{has_errors, Diagnostic},
    error::{RazorError, Result},
    generator::normalize_type_name,
    model::MemberInfo,
};

pub use image::{AssemblyImage, ImageError, Instruction, Operand, TypeDefinition};
pub use toolchain::ProgramToolchain;

/// Core runtime library
pub const CORE_ASSEMBLY: &str = "razor.core";

/// Dynamic member binding support
pub const DYNAMIC_ASSEMBLY: &str = "razor.dynamic";

/// Interop glue required alongside [`DYNAMIC_ASSEMBLY`]
pub const INTEROP_ASSEMBLY: &str = "razor.interop";

/// What a referenced type is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// A template contract
    Contract {
        /// Qualified model type name, `None` for dynamic models
        model: Option<String>,
        /// Helper names callable from templates
        helpers: Vec<String>,
    },
    /// A model type
    Model {
        /// Declared members
        members: Vec<MemberInfo>,
    },
}

/// Type exported by a reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
    /// Qualified name in generic syntax
    pub name: String,
    /// Kind and details
    pub kind: TypeKind,
}

/// Metadata of a referenced assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataReference {
    /// Assembly name
    pub assembly: String,
    /// Exported types
    pub types: Vec<TypeMetadata>,
}

impl MetadataReference {
    /// Reference with no exported types
    pub fn new(assembly: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            types: Vec::new(),
        }
    }

    /// Add an exported type
    pub fn with_type(mut self, name: impl Into<String>, kind: TypeKind) -> Self {
        self.types.push(TypeMetadata {
            name: name.into(),
            kind,
        });
        self
    }
}

/// Everything a toolchain needs to compile one template
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Name of the produced assembly
    pub assembly_name: String,
    /// Program source
    pub source: String,
    /// Referenced assemblies
    pub references: Vec<MetadataReference>,
}

impl CompilationUnit {
    /// Look up an exported type across all references
    pub fn find_type(&self, name: &str) -> Option<&TypeMetadata> {
        self.references
            .iter()
            .flat_map(|reference| reference.types.iter())
            .find(|ty| ty.name == name)
    }

    /// Whether an assembly is referenced
    pub fn references_assembly(&self, assembly: &str) -> bool {
        self.references.iter().any(|r| r.assembly == assembly)
    }
}

/// Successful compilation output
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Name of the produced assembly
    pub assembly_name: String,
    /// Program image bytes
    pub image: Vec<u8>,
    /// Non-error diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

impl Artifact {
    /// Program image bytes
    pub fn image(&self) -> &[u8] {
        &self.image
    }
}

/// Compiles program source into an image
pub trait Toolchain: Send + Sync {
    /// Compile a unit, or return every diagnostic when any of them is an error
    fn compile(&self, unit: &CompilationUnit) -> std::result::Result<Artifact, Vec<Diagnostic>>;
}

/// Builds compilation units and drives the toolchain
#[derive(Clone)]
pub struct CompilationUnitBuilder {
    toolchain: Arc<dyn Toolchain>,
}

impl CompilationUnitBuilder {
    /// Create a builder around a toolchain
    pub fn new(toolchain: Arc<dyn Toolchain>) -> Self {
        Self { toolchain }
    }

    /// Fixed reference set for a contract
    ///
    /// The core library, the assembly defining the contract (exporting the
    /// contract type and its model type) and the dynamic binding pair.
    pub fn references(base: &BaseKind) -> Vec<MetadataReference> {
        let contract_type = normalize_type_name(&base.type_name());
        let shape = base.model_shape();
        let helpers = base.helpers().iter().map(|h| h.name.clone()).collect();

        let mut contract = MetadataReference::new(base.assembly()).with_type(
            contract_type,
            TypeKind::Contract {
                model: shape.map(|s| s.qualified_name()),
                helpers,
            },
        );
        if let Some(shape) = shape {
            contract = contract.with_type(
                shape.qualified_name(),
                TypeKind::Model {
                    members: shape.members.clone(),
                },
            );
        }

        vec![
            MetadataReference::new(CORE_ASSEMBLY),
            contract,
            MetadataReference::new(DYNAMIC_ASSEMBLY),
            MetadataReference::new(INTEROP_ASSEMBLY),
        ]
    }

    /// Compile source against a contract
    ///
    /// Any error diagnostic fails the whole compilation with
    /// [`RazorError::Compilation`].
    pub fn compile(&self, base: &BaseKind, assembly_name: &str, source: &str) -> Result<Artifact> {
        let unit = CompilationUnit {
            assembly_name: assembly_name.to_string(),
            source: source.to_string(),
            references: Self::references(base),
        };

        debug!(
            assembly = %unit.assembly_name,
            references = unit.references.len(),
            "Compiling template"
        );

        match self.toolchain.compile(&unit) {
            Ok(artifact) => {
                for diagnostic in &artifact.diagnostics {
                    warn!(%diagnostic, "Template compiled with warning");
                }
                Ok(artifact)
            }
            Err(mut diagnostics) => {
                if !has_errors(&diagnostics) {
                    diagnostics.push(Diagnostic::error(
                        "RZC0000",
                        "Compilation failed without reporting an error",
                    ));
                }
                Err(RazorError::compilation(diagnostics))
            }
        }
    }
}
