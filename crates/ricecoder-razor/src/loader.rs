//! Loading compiled images
//!
//! The registry only sees [`DynamicLoader`] and [`LoadedModule`]. The
//! bundled [`ImageLoader`] decodes images produced by
//! [`ProgramToolchain`](crate::compiler::ProgramToolchain) and exposes each
//! type as a [`ProgramType`].

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    compiler::{AssemblyImage, Instruction},
    error::{RazorError, Result},
    runtime::{ProgramTemplate, Template, TemplateType, TypeHandle},
};

/// Loads program images into the running process
pub trait DynamicLoader: Send + Sync {
    /// Load an image
    ///
    /// Failures are [`RazorError::Instantiation`].
    fn load(&self, image: &[u8]) -> Result<Arc<dyn LoadedModule>>;
}

/// A loaded image
pub trait LoadedModule: Send + Sync {
    /// Assembly name recorded in the image
    fn assembly_name(&self) -> &str;

    /// Find a type by namespace-qualified name
    fn resolve_type(&self, qualified_name: &str) -> Option<TypeHandle>;
}

/// Loader for images in the bundled format
#[derive(Debug, Clone, Default)]
pub struct ImageLoader;

impl ImageLoader {
    /// Create a loader
    pub fn new() -> Self {
        Self
    }
}

impl DynamicLoader for ImageLoader {
    fn load(&self, image: &[u8]) -> Result<Arc<dyn LoadedModule>> {
        let assembly = AssemblyImage::decode(image)
            .map_err(|e| RazorError::Instantiation(format!("Failed to load image: {}", e)))?;

        debug!(
            assembly = %assembly.name,
            types = assembly.types.len(),
            "Loaded template image"
        );

        let name: Arc<str> = Arc::from(assembly.name.as_str());
        let types = assembly
            .types
            .into_iter()
            .map(|definition| {
                let handle = TypeHandle::new(
                    name.clone(),
                    Arc::new(ProgramType {
                        name: definition.name.clone(),
                        body: definition.body.into(),
                    }),
                );
                (definition.name, handle)
            })
            .collect();

        Ok(Arc::new(ImageModule { name, types }))
    }
}

/// Module decoded by [`ImageLoader`]
struct ImageModule {
    name: Arc<str>,
    types: HashMap<String, TypeHandle>,
}

impl LoadedModule for ImageModule {
    fn assembly_name(&self) -> &str {
        &self.name
    }

    fn resolve_type(&self, qualified_name: &str) -> Option<TypeHandle> {
        self.types.get(qualified_name).cloned()
    }
}

/// Template type defined by a loaded image
#[derive(Debug)]
pub struct ProgramType {
    name: String,
    body: Arc<[Instruction]>,
}

impl TemplateType for ProgramType {
    fn qualified_name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Option<Box<dyn Template>> {
        Some(Box::new(ProgramTemplate::new(self.body.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::TypeDefinition;

    fn image() -> Vec<u8> {
        AssemblyImage {
            name: "app.templates".to_string(),
            types: vec![TypeDefinition {
                name: "app.templates.Template".to_string(),
                base_type: "razor.runtime.TemplateBase".to_string(),
                body: vec![Instruction::Literal("x".to_string())],
            }],
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_load_and_resolve() {
        let module = ImageLoader::new().load(&image()).unwrap();
        assert_eq!(module.assembly_name(), "app.templates");

        let handle = module.resolve_type("app.templates.Template").unwrap();
        assert_eq!(handle.assembly_name(), "app.templates");
        assert!(handle.template_type().instantiate().is_some());

        let again = module.resolve_type("app.templates.Template").unwrap();
        assert!(TypeHandle::ptr_eq(&handle, &again));
        assert!(module.resolve_type("app.templates.Other").is_none());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = ImageLoader::new().load(b"not an image").err().unwrap();
        assert!(matches!(err, RazorError::Instantiation(_)));
    }
}
