//! Caller-facing engine
//!
//! ```ignore
//! let engine = RazorEngine::new();
//! engine.add_template("greeting", "Hello @Model.Name!")?;
//!
//! let mut model = json!({ "Name": "Ada" });
//! let text = engine.run("greeting", &mut model).await?;
//! assert_eq!(text, "Hello Ada!");
//! ```

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tracing::debug;

use crate::{
    compiler::{CompilationUnitBuilder, ProgramToolchain, Toolchain},
    config::EngineConfig,
    contract::{BaseKind, TemplateContract},
    error::Result,
    generator::SourceGenerator,
    loader::{DynamicLoader, ImageLoader},
    markup::{MarkupTranslator, RazorTranslator},
    model::{AnonymousModel, MemberAccess, Model, TypedBinding},
    registry::{RegisteredTemplate, TemplateRegistry},
    runtime::{DefaultTemplateFactory, TemplateBase, TemplateFactory, TypeHandle},
};

/// Compiles, caches and runs templates
///
/// Safe to share across tasks; wrap it in an [`Arc`] to do so.
pub struct RazorEngine {
    registry: TemplateRegistry,
    factory: Arc<dyn TemplateFactory>,
}

impl Default for RazorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RazorEngine {
    /// Engine with the bundled translator, toolchain and loader
    pub fn new() -> Self {
        Self::with_parts(EngineParts::default())
    }

    /// Builder for injecting collaborators and configuration
    pub fn builder() -> RazorEngineBuilder {
        RazorEngineBuilder::default()
    }

    fn with_parts(parts: EngineParts) -> Self {
        let generator = SourceGenerator::new(parts.translator, &parts.config);
        let builder = CompilationUnitBuilder::new(parts.toolchain);
        Self {
            registry: TemplateRegistry::new(generator, builder, parts.loader, &parts.config),
            factory: parts.factory,
        }
    }

    /// The template registry
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Register an untyped template
    pub fn add_template(&self, name: &str, source: &str) -> Result<TypeHandle> {
        self.registry.register(name, BaseKind::Untyped, source)
    }

    /// Register a template bound to model type `M`
    ///
    /// Models without a declared shape get the untyped contract.
    pub fn add_typed_template<M: Model>(&self, name: &str, source: &str) -> Result<TypeHandle> {
        self.registry.register(name, BaseKind::for_model::<M>(), source)
    }

    /// Register a template compiled against a caller-defined contract
    pub fn add_custom_template<C: TemplateContract>(
        &self,
        name: &str,
        source: &str,
    ) -> Result<TypeHandle> {
        self.registry.register(name, BaseKind::custom::<C>(), source)
    }

    /// Run a registered template and return its output
    pub async fn run<M: Model>(&self, name: &str, model: &mut M) -> Result<String> {
        let entry = self.registry.entry(name)?;
        self.materialize(&entry, model).await
    }

    /// Run a registered template into `writer`
    pub async fn run_to<M, W>(&self, name: &str, model: &mut M, writer: &mut W) -> Result<()>
    where
        M: Model,
        W: AsyncWrite + Unpin + Send,
    {
        let entry = self.registry.entry(name)?;
        self.execute(&entry, model, writer).await
    }

    /// Run `name`, registering `source` under it first if it is absent
    ///
    /// An existing template is reused without recompiling, even when
    /// `source` differs.
    pub async fn run_compile<M: Model>(
        &self,
        name: &str,
        source: &str,
        model: &mut M,
    ) -> Result<String> {
        let entry = self
            .registry
            .register_or_resolve(name, BaseKind::for_model::<M>(), source)?;
        self.materialize(&entry, model).await
    }

    /// Streaming form of [`RazorEngine::run_compile`]
    pub async fn run_compile_to<M, W>(
        &self,
        name: &str,
        source: &str,
        model: &mut M,
        writer: &mut W,
    ) -> Result<()>
    where
        M: Model,
        W: AsyncWrite + Unpin + Send,
    {
        let entry = self
            .registry
            .register_or_resolve(name, BaseKind::for_model::<M>(), source)?;
        self.execute(&entry, model, writer).await
    }

    /// [`RazorEngine::run_compile`] against a caller-defined contract
    pub async fn run_compile_custom<C: TemplateContract>(
        &self,
        name: &str,
        source: &str,
        model: &mut C::Model,
    ) -> Result<String> {
        let entry = self
            .registry
            .register_or_resolve(name, BaseKind::custom::<C>(), source)?;
        self.materialize(&entry, model).await
    }

    /// Streaming form of [`RazorEngine::run_compile_custom`]
    pub async fn run_compile_custom_to<C, W>(
        &self,
        name: &str,
        source: &str,
        model: &mut C::Model,
        writer: &mut W,
    ) -> Result<()>
    where
        C: TemplateContract,
        W: AsyncWrite + Unpin + Send,
    {
        let entry = self
            .registry
            .register_or_resolve(name, BaseKind::custom::<C>(), source)?;
        self.execute(&entry, model, writer).await
    }

    async fn materialize<M: Model>(&self, entry: &RegisteredTemplate, model: &mut M) -> Result<String> {
        let mut out: Vec<u8> = Vec::new();
        self.execute(entry, model, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    async fn execute<M, W>(&self, entry: &RegisteredTemplate, model: &mut M, writer: &mut W) -> Result<()>
    where
        M: Model,
        W: AsyncWrite + Unpin + Send,
    {
        entry.base.check_model::<M>()?;

        debug!(
            template = %entry.handle.qualified_name(),
            base = entry.base.label(),
            "Executing template"
        );

        match M::shape() {
            None => {
                let mut access = AnonymousModel::new(model);
                self.render(entry, &mut access, writer).await
            }
            Some(_) => {
                let mut access = TypedBinding::new(model);
                self.render(entry, &mut access, writer).await
            }
        }
    }

    async fn render<A, W>(&self, entry: &RegisteredTemplate, access: &mut A, writer: &mut W) -> Result<()>
    where
        A: MemberAccess,
        W: AsyncWrite + Unpin + Send,
    {
        let template = self.factory.create(&entry.handle)?;
        let mut base = TemplateBase::new(writer, access, entry.base.helpers());
        template.execute(&mut base).await
    }
}

/// Collaborators and configuration an engine is assembled from
struct EngineParts {
    translator: Arc<dyn MarkupTranslator>,
    toolchain: Arc<dyn Toolchain>,
    loader: Arc<dyn DynamicLoader>,
    factory: Arc<dyn TemplateFactory>,
    config: EngineConfig,
}

impl Default for EngineParts {
    fn default() -> Self {
        Self {
            translator: Arc::new(RazorTranslator::new()),
            toolchain: Arc::new(ProgramToolchain::new()),
            loader: Arc::new(ImageLoader::new()),
            factory: Arc::new(DefaultTemplateFactory),
            config: EngineConfig::default(),
        }
    }
}

/// Builder for [`RazorEngine`]
#[derive(Default)]
pub struct RazorEngineBuilder {
    translator: Option<Arc<dyn MarkupTranslator>>,
    toolchain: Option<Arc<dyn Toolchain>>,
    loader: Option<Arc<dyn DynamicLoader>>,
    factory: Option<Arc<dyn TemplateFactory>>,
    config: Option<EngineConfig>,
}

impl RazorEngineBuilder {
    /// Markup translator
    pub fn translator(mut self, translator: Arc<dyn MarkupTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Compiler toolchain
    pub fn toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Image loader
    pub fn loader(mut self, loader: Arc<dyn DynamicLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Template instance factory
    pub fn factory(mut self, factory: Arc<dyn TemplateFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Engine configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the engine, validating the configuration
    pub fn build(self) -> Result<RazorEngine> {
        let defaults = EngineParts::default();
        let config = self.config.unwrap_or(defaults.config);
        config.validate()?;

        Ok(RazorEngine::with_parts(EngineParts {
            translator: self.translator.unwrap_or(defaults.translator),
            toolchain: self.toolchain.unwrap_or(defaults.toolchain),
            loader: self.loader.unwrap_or(defaults.loader),
            factory: self.factory.unwrap_or(defaults.factory),
            config,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::RazorError, model::tests::Person};
    use serde_json::json;

    #[tokio::test]
    async fn test_add_and_run_untyped() {
        let engine = RazorEngine::new();
        engine.add_template("hello", "Hello @Model.Name!").unwrap();

        let mut model = json!({"Name": "Ada"});
        assert_eq!(engine.run("hello", &mut model).await.unwrap(), "Hello Ada!");
    }

    #[tokio::test]
    async fn test_run_unknown_template() {
        let engine = RazorEngine::new();
        let mut model = json!({});
        let err = engine.run("missing", &mut model).await.unwrap_err();
        assert!(matches!(err, RazorError::TemplateNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_typed_template() {
        let engine = RazorEngine::new();
        engine
            .add_typed_template::<Person>("p", "@Model.Name is @Model.Age")
            .unwrap();

        let mut person = Person {
            name: "Ada".to_string(),
            age: 36,
        };
        assert_eq!(engine.run("p", &mut person).await.unwrap(), "Ada is 36");

        let mut anonymous = json!({"Name": "x", "Age": 1});
        assert!(matches!(
            engine.run("p", &mut anonymous).await,
            Err(RazorError::Instantiation(_))
        ));
    }

    #[tokio::test]
    async fn test_untyped_template_with_typed_model() {
        let engine = RazorEngine::new();
        engine.add_template("t", "@Model.Name").unwrap();

        let mut person = Person {
            name: "Grace".to_string(),
            age: 1,
        };
        assert_eq!(engine.run("t", &mut person).await.unwrap(), "Grace");
    }

    #[tokio::test]
    async fn test_set_on_typed_model_writes_through() {
        let engine = RazorEngine::new();
        engine
            .add_typed_template::<Person>("p", "@{ Model.Name = \"Grace\"; }@Model.Name")
            .unwrap();

        let mut person = Person::default();
        assert_eq!(engine.run("p", &mut person).await.unwrap(), "Grace");
        assert_eq!(person.name, "Grace");
    }

    #[tokio::test]
    async fn test_run_compile_reuses_entry() {
        let engine = RazorEngine::new();
        let mut model = json!({"Name": "Ada"});
        assert_eq!(
            engine.run_compile("t", "A @Model.Name", &mut model).await.unwrap(),
            "A Ada"
        );
        assert_eq!(
            engine.run_compile("t", "B @Model.Name", &mut model).await.unwrap(),
            "A Ada"
        );
    }

    #[tokio::test]
    async fn test_extreme_number_literals_render() {
        let engine = RazorEngine::new();
        engine.add_template("small", "@(0.0000001)").unwrap();
        engine
            .add_template("large", "@(100000000000000000000.5)")
            .unwrap();

        let mut model = json!({});
        let small = engine.run("small", &mut model).await.unwrap();
        assert_eq!(small.parse::<f64>().unwrap(), 0.0000001);
        let large = engine.run("large", &mut model).await.unwrap();
        assert_eq!(large.parse::<f64>().unwrap(), 1e20);
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_config() {
        let result = RazorEngine::builder()
            .config(EngineConfig {
                class_name: String::new(),
                ..Default::default()
            })
            .build();
        assert!(matches!(result, Err(RazorError::Config(_))));
    }

    #[tokio::test]
    async fn test_builder_class_name() {
        let engine = RazorEngine::builder()
            .config(EngineConfig {
                class_name: "Page".to_string(),
                ..Default::default()
            })
            .build()
            .unwrap();
        let handle = engine.add_template("t", "x").unwrap();
        assert_eq!(handle.qualified_name(), "razor.runtime.Page");
    }
}
