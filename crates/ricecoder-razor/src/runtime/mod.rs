//! Template instances and their execution contract
//!
//! A loaded template type is referenced through an immutable [`TypeHandle`].
//! Executing a template creates a fresh instance through a
//! [`TemplateFactory`], points it at a writer and a model through
//! [`TemplateBase`], and awaits [`Template::execute`].

pub mod interpreter;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    contract::Helper,
    error::{RazorError, Result},
    model::{MemberAccess, Value},
};

pub use interpreter::ProgramTemplate;

/// An executable template instance
#[async_trait]
pub trait Template: Send + Sync {
    /// Render into the writer held by `base`, reading and writing its model
    async fn execute(&self, base: &mut TemplateBase<'_>) -> Result<()>;
}

/// A loaded template type
pub trait TemplateType: Send + Sync {
    /// Namespace-qualified type name
    fn qualified_name(&self) -> &str;

    /// Create an instance, `None` if the type cannot be constructed
    fn instantiate(&self) -> Option<Box<dyn Template>>;
}

/// Handle to a loaded template type
///
/// Handles are immutable and cheap to clone. Two handles are the same entry
/// only if [`TypeHandle::ptr_eq`] holds.
#[derive(Clone)]
pub struct TypeHandle {
    assembly: Arc<str>,
    ty: Arc<dyn TemplateType>,
}

impl TypeHandle {
    /// Wrap a loaded type
    pub fn new(assembly: impl Into<Arc<str>>, ty: Arc<dyn TemplateType>) -> Self {
        Self {
            assembly: assembly.into(),
            ty,
        }
    }

    /// Namespace-qualified type name
    pub fn qualified_name(&self) -> &str {
        self.ty.qualified_name()
    }

    /// Name of the assembly the type was loaded from
    pub fn assembly_name(&self) -> &str {
        &self.assembly
    }

    /// The loaded type
    pub fn template_type(&self) -> &dyn TemplateType {
        self.ty.as_ref()
    }

    /// Whether both handles refer to the same loaded type
    pub fn ptr_eq(a: &TypeHandle, b: &TypeHandle) -> bool {
        Arc::ptr_eq(&a.ty, &b.ty)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("assembly", &self.assembly)
            .field("type", &self.qualified_name())
            .finish()
    }
}

/// Creates template instances from handles
pub trait TemplateFactory: Send + Sync {
    /// Create a fresh instance
    fn create(&self, handle: &TypeHandle) -> Result<Box<dyn Template>>;
}

/// Factory using the type's no-argument construction
#[derive(Debug, Clone, Default)]
pub struct DefaultTemplateFactory;

impl TemplateFactory for DefaultTemplateFactory {
    fn create(&self, handle: &TypeHandle) -> Result<Box<dyn Template>> {
        handle.template_type().instantiate().ok_or_else(|| {
            RazorError::Instantiation(format!(
                "Could not create an instance of '{}'",
                handle.qualified_name()
            ))
        })
    }
}

/// Writer slot type
pub type OutputWriter<'a> = dyn AsyncWrite + Unpin + Send + 'a;

/// State shared with an executing template
pub struct TemplateBase<'a> {
    writer: &'a mut OutputWriter<'a>,
    model: &'a mut (dyn MemberAccess + 'a),
    helpers: &'a [Helper],
}

impl<'a> TemplateBase<'a> {
    /// Bind a writer, a model and the contract's helpers
    pub fn new(
        writer: &'a mut OutputWriter<'a>,
        model: &'a mut (dyn MemberAccess + 'a),
        helpers: &'a [Helper],
    ) -> Self {
        Self {
            writer,
            model,
            helpers,
        }
    }

    /// The bound model
    pub fn model(&self) -> &dyn MemberAccess {
        &*self.model
    }

    /// The bound model, writable
    pub fn model_mut(&mut self) -> &mut dyn MemberAccess {
        &mut *self.model
    }

    /// Write text verbatim
    pub async fn write_literal(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        Ok(())
    }

    /// Write the rendered form of a value
    pub async fn write(&mut self, value: &Value) -> Result<()> {
        if let Some(text) = render_value(value) {
            self.writer.write_all(text.as_bytes()).await?;
        }
        Ok(())
    }

    /// Look up a helper
    pub fn helper(&self, name: &str) -> Option<&Helper> {
        self.helpers.iter().find(|h| h.name == name)
    }

    /// Call a helper by name
    ///
    /// Unknown helpers and helper failures are [`RazorError::Execution`].
    pub fn call_helper(&self, name: &str, args: &[Value]) -> Result<Value> {
        let helper = self
            .helper(name)
            .ok_or_else(|| RazorError::Execution(format!("Unknown helper '{}'", name)))?;
        (helper.func)(args)
            .map_err(|e| RazorError::Execution(format!("Helper '{}' failed: {}", name, e)))
    }

    /// Flush the writer
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Text written for a value; `None` writes nothing
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnonymousModel;
    use serde_json::json;

    struct Fixed(&'static str);

    #[async_trait]
    impl Template for Fixed {
        async fn execute(&self, base: &mut TemplateBase<'_>) -> Result<()> {
            base.write_literal(self.0).await
        }
    }

    struct Abstract;

    impl TemplateType for Abstract {
        fn qualified_name(&self) -> &str {
            "app.Abstract"
        }

        fn instantiate(&self) -> Option<Box<dyn Template>> {
            None
        }
    }

    struct Concrete;

    impl TemplateType for Concrete {
        fn qualified_name(&self) -> &str {
            "app.Concrete"
        }

        fn instantiate(&self) -> Option<Box<dyn Template>> {
            Some(Box::new(Fixed("ok")))
        }
    }

    fn exclaim(args: &[Value]) -> std::result::Result<Value, String> {
        match args {
            [Value::String(s)] => Ok(json!(format!("{}!", s))),
            _ => Err("expected one string".to_string()),
        }
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&json!("a\"b")), Some("a\"b".to_string()));
        assert_eq!(render_value(&Value::Null), None);
        assert_eq!(render_value(&json!(42)), Some("42".to_string()));
        assert_eq!(render_value(&json!(true)), Some("true".to_string()));
        assert_eq!(render_value(&json!([1, "x"])), Some("[1,\"x\"]".to_string()));
    }

    #[test]
    fn test_handle_identity() {
        let ty: Arc<dyn TemplateType> = Arc::new(Concrete);
        let a = TypeHandle::new("app", ty.clone());
        let b = a.clone();
        let c = TypeHandle::new("app", Arc::new(Concrete));
        assert!(TypeHandle::ptr_eq(&a, &b));
        assert!(!TypeHandle::ptr_eq(&a, &c));
        assert_eq!(a.qualified_name(), "app.Concrete");
        assert_eq!(a.assembly_name(), "app");
    }

    #[test]
    fn test_default_factory() {
        let factory = DefaultTemplateFactory;
        assert!(factory
            .create(&TypeHandle::new("app", Arc::new(Concrete)))
            .is_ok());
        assert!(matches!(
            factory.create(&TypeHandle::new("app", Arc::new(Abstract))),
            Err(RazorError::Instantiation(_))
        ));
    }

    #[tokio::test]
    async fn test_template_base_writes() {
        let mut model = json!({});
        let mut binding = AnonymousModel::new(&mut model);
        let mut out: Vec<u8> = Vec::new();
        let helpers = vec![Helper::new("Exclaim", exclaim)];
        {
            let mut base = TemplateBase::new(&mut out, &mut binding, &helpers);
            base.write_literal("a").await.unwrap();
            base.write(&Value::Null).await.unwrap();
            base.write(&json!(1.5)).await.unwrap();
            let value = base.call_helper("Exclaim", &[json!("hi")]).unwrap();
            base.write(&value).await.unwrap();
            assert!(matches!(
                base.call_helper("Exclaim", &[]),
                Err(RazorError::Execution(_))
            ));
            assert!(matches!(
                base.call_helper("Missing", &[]),
                Err(RazorError::Execution(_))
            ));
        }
        assert_eq!(String::from_utf8(out).unwrap(), "a1.5hi!");
    }

    #[tokio::test]
    async fn test_execute_fixed_template() {
        let mut model = json!({});
        let mut binding = AnonymousModel::new(&mut model);
        let mut out: Vec<u8> = Vec::new();
        {
            let mut base = TemplateBase::new(&mut out, &mut binding, &[]);
            Fixed("done").execute(&mut base).await.unwrap();
        }
        assert_eq!(out, b"done");
    }
}
