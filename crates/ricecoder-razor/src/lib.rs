#![warn(missing_docs)]

//! Dynamic template compilation for ricecoder
//!
//! Razor-style markup templates are translated into program source, compiled
//! against a base contract, loaded and cached by name, then executed against
//! caller-supplied models to produce text, either materialized into a
//! `String` or streamed into an async writer.

pub mod compiler;
pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod generator;
pub mod loader;
pub mod markup;
pub mod model;
pub mod registry;
pub mod runtime;

// Re-export public API
pub use compiler::{
    Artifact, CompilationUnit, CompilationUnitBuilder, MetadataReference, ProgramToolchain,
    Toolchain, TypeKind, TypeMetadata,
};
pub use config::EngineConfig;
pub use contract::{BaseKind, CustomContract, Helper, HelperFn, TemplateContract};
pub use diagnostics::{Diagnostic, Location, Severity};
pub use engine::{RazorEngine, RazorEngineBuilder};
pub use error::{RazorError, Result};
pub use generator::{GeneratedSource, SourceGenerator};
pub use loader::{DynamicLoader, ImageLoader, LoadedModule};
pub use markup::{MarkupTranslator, RazorTranslator, SourceDocument, TranslationOptions};
pub use model::{AnonymousModel, MemberAccess, MemberInfo, Model, ModelShape, TypedBinding, Value};
pub use registry::{RegisteredTemplate, TemplateRegistry};
pub use runtime::{
    DefaultTemplateFactory, Template, TemplateBase, TemplateFactory, TemplateType, TypeHandle,
};
