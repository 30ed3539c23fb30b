//! Template registry
//!
//! Maps template names to loaded template types. Registration runs the whole
//! pipeline (generate, compile, load, resolve) before touching the map, so a
//! failed registration leaves the registry exactly as it was and readers
//! never observe a half-registered template.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{
    compiler::CompilationUnitBuilder,
    config::EngineConfig,
    contract::BaseKind,
    error::{RazorError, Result},
    generator::SourceGenerator,
    loader::DynamicLoader,
    runtime::TypeHandle,
};

/// A registered template: its loaded type and the contract it was compiled against
#[derive(Debug, Clone)]
pub struct RegisteredTemplate {
    /// Loaded template type
    pub handle: TypeHandle,
    /// Contract chosen at registration
    pub base: BaseKind,
}

/// Name to template mapping with atomic registration
pub struct TemplateRegistry {
    entries: RwLock<HashMap<String, RegisteredTemplate>>,
    generator: SourceGenerator,
    builder: CompilationUnitBuilder,
    loader: Arc<dyn DynamicLoader>,
    assembly_name: Option<String>,
    trace_generated_source: bool,
}

impl TemplateRegistry {
    /// Create an empty registry
    pub fn new(
        generator: SourceGenerator,
        builder: CompilationUnitBuilder,
        loader: Arc<dyn DynamicLoader>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generator,
            builder,
            loader,
            assembly_name: config.assembly_name.clone(),
            trace_generated_source: config.trace_generated_source,
        }
    }

    /// Compile `source` against `base` and bind it to `name`
    ///
    /// Replaces any existing entry. On failure the registry is unchanged.
    pub fn register(&self, name: &str, base: BaseKind, source: &str) -> Result<TypeHandle> {
        let entry = self.build(base, source)?;
        let handle = entry.handle.clone();
        let label = entry.base.label();

        let replaced = self
            .entries
            .write()
            .insert(name.to_string(), entry)
            .is_some();

        if replaced {
            info!(template = %name, base = label, "Replaced template");
        } else {
            info!(template = %name, base = label, "Registered template");
        }
        Ok(handle)
    }

    /// Handle registered under `name`
    pub fn resolve(&self, name: &str) -> Result<TypeHandle> {
        self.entry(name).map(|entry| entry.handle)
    }

    /// Full entry registered under `name`
    pub fn entry(&self, name: &str) -> Result<RegisteredTemplate> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RazorError::TemplateNotFound(name.to_string()))
    }

    /// Existing entry for `name`, or register `source` under it
    ///
    /// An existing entry is returned as is, even if `source` differs from
    /// what it was compiled from. When several callers race on an absent
    /// name they may each compile, but all of them get the entry inserted
    /// first.
    pub fn register_or_resolve(
        &self,
        name: &str,
        base: BaseKind,
        source: &str,
    ) -> Result<RegisteredTemplate> {
        if let Some(existing) = self.entries.read().get(name).cloned() {
            debug!(template = %name, "Reusing registered template");
            return Ok(existing);
        }

        let entry = self.build(base, source)?;
        let mut entries = self.entries.write();
        let inserted = entries.entry(name.to_string()).or_insert_with(|| {
            info!(template = %name, base = entry.base.label(), "Registered template");
            entry
        });
        Ok(inserted.clone())
    }

    /// Whether a template is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Number of registered templates
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no template is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the pipeline without touching the map
    fn build(&self, base: BaseKind, source: &str) -> Result<RegisteredTemplate> {
        let generated = self.generator.generate(&base, source)?;
        if self.trace_generated_source {
            debug!(
                document = %generated.document,
                source = %generated.source,
                "Generated template source"
            );
        }

        let assembly_name = self
            .assembly_name
            .as_deref()
            .unwrap_or_else(|| base.assembly());
        let artifact = self
            .builder
            .compile(&base, assembly_name, &generated.source)?;

        let module = self.loader.load(artifact.image())?;
        let handle = module.resolve_type(&generated.type_name).ok_or_else(|| {
            RazorError::Instantiation(format!(
                "Type '{}' not found in assembly '{}'",
                generated.type_name,
                module.assembly_name()
            ))
        })?;

        debug!(
            type_name = %handle.qualified_name(),
            assembly = %handle.assembly_name(),
            "Loaded template type"
        );
        Ok(RegisteredTemplate { handle, base })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::ProgramToolchain, loader::ImageLoader, markup::RazorTranslator,
        model::tests::Person,
    };

    fn registry() -> TemplateRegistry {
        registry_with(EngineConfig::default())
    }

    fn registry_with(config: EngineConfig) -> TemplateRegistry {
        TemplateRegistry::new(
            SourceGenerator::new(Arc::new(RazorTranslator::new()), &config),
            CompilationUnitBuilder::new(Arc::new(ProgramToolchain::new())),
            Arc::new(ImageLoader::new()),
            &config,
        )
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = registry();
        let handle = registry
            .register("hello", BaseKind::Untyped, "Hello @Model.Name")
            .unwrap();
        assert_eq!(handle.qualified_name(), "razor.runtime.Template");
        assert_eq!(handle.assembly_name(), "razor.runtime");

        let resolved = registry.resolve("hello").unwrap();
        assert!(TypeHandle::ptr_eq(&handle, &resolved));
        assert!(registry.contains("hello"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown() {
        let err = registry().resolve("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_register_replaces() {
        let registry = registry();
        let first = registry.register("t", BaseKind::Untyped, "one").unwrap();
        let second = registry.register("t", BaseKind::Untyped, "two").unwrap();
        assert!(!TypeHandle::ptr_eq(&first, &second));
        assert!(TypeHandle::ptr_eq(&registry.resolve("t").unwrap(), &second));
        assert_eq!(registry.names(), vec!["t".to_string()]);
    }

    #[test]
    fn test_failed_registration_keeps_previous_entry() {
        let registry = registry();
        let good = registry.register("t", BaseKind::Untyped, "ok").unwrap();

        let base = BaseKind::for_model::<Person>();
        let err = registry.register("t", base, "@Model.Nickname").unwrap_err();
        assert_eq!(err.diagnostics()[0].id, "RZC1061");
        assert!(TypeHandle::ptr_eq(&registry.resolve("t").unwrap(), &good));

        assert!(registry.register("u", BaseKind::Untyped, "@(").is_err());
        assert!(!registry.contains("u"));
    }

    #[test]
    fn test_register_or_resolve_reuses() {
        let registry = registry();
        let first = registry
            .register_or_resolve("t", BaseKind::Untyped, "one")
            .unwrap();
        let second = registry
            .register_or_resolve("t", BaseKind::Untyped, "@(broken")
            .unwrap();
        assert!(TypeHandle::ptr_eq(&first.handle, &second.handle));
    }

    #[test]
    fn test_assembly_name_override() {
        let registry = registry_with(EngineConfig {
            assembly_name: Some("app.generated".to_string()),
            ..Default::default()
        });
        let handle = registry.register("t", BaseKind::Untyped, "x").unwrap();
        assert_eq!(handle.assembly_name(), "app.generated");
    }

    #[test]
    fn test_names_sorted() {
        let registry = registry();
        registry.register("b", BaseKind::Untyped, "b").unwrap();
        registry.register("a", BaseKind::Untyped, "a").unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(!registry.is_empty());
    }
}
