//! Base contracts a compiled template conforms to
//!
//! Every template is compiled against one of three contracts:
//! - the untyped contract, whose model is addressed dynamically
//! - the typed contract for a model that declares a [`ModelShape`]
//! - a caller-defined [`TemplateContract`] extending the typed contract with
//!   named helpers callable from markup

use std::fmt;

use crate::{
    error::{RazorError, Result},
    model::{Model, ModelShape, Value},
};

/// Namespace of the built-in contracts
pub const RUNTIME_NAMESPACE: &str = "razor.runtime";

/// Assembly defining the built-in contracts
pub const RUNTIME_ASSEMBLY: &str = "razor.runtime";

/// Name of the built-in contract type
pub const BASE_TYPE_NAME: &str = "TemplateBase";

/// Signature of a helper exposed by a custom contract
pub type HelperFn = fn(&[Value]) -> std::result::Result<Value, String>;

/// A named helper callable from markup as `@Name(args)`
#[derive(Clone)]
pub struct Helper {
    /// Name used in markup
    pub name: String,
    /// Implementation
    pub func: HelperFn,
}

impl Helper {
    /// Create a helper
    pub fn new(name: impl Into<String>, func: HelperFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper").field("name", &self.name).finish()
    }
}

/// A caller-defined contract extending the typed contract
///
/// ```ignore
/// struct Mailer;
///
/// impl TemplateContract for Mailer {
///     type Model = Order;
///     fn namespace() -> &'static str { "shop.mail" }
///     fn name() -> &'static str { "MailTemplate" }
///     fn helpers() -> Vec<Helper> { vec![Helper::new("Upper", upper)] }
/// }
/// ```
pub trait TemplateContract: Send + Sync + 'static {
    /// Model type templates of this contract are bound to
    type Model: Model;

    /// Namespace of the contract type
    fn namespace() -> &'static str;

    /// Contract type name
    fn name() -> &'static str;

    /// Assembly defining the contract type
    fn assembly() -> &'static str {
        Self::namespace()
    }

    /// Helpers exposed to templates
    fn helpers() -> Vec<Helper> {
        Vec::new()
    }
}

/// Resolved description of a custom contract
#[derive(Debug, Clone)]
pub struct CustomContract {
    /// Namespace of the contract type
    pub namespace: String,
    /// Contract type name
    pub name: String,
    /// Assembly defining the contract type
    pub assembly: String,
    /// Model shape, `None` when the contract's model is ad hoc
    pub model: Option<ModelShape>,
    /// Helpers exposed to templates
    pub helpers: Vec<Helper>,
}

impl CustomContract {
    /// Describe a contract type
    pub fn of<C: TemplateContract>() -> Self {
        Self {
            namespace: C::namespace().to_string(),
            name: C::name().to_string(),
            assembly: C::assembly().to_string(),
            model: <C::Model as Model>::shape(),
            helpers: C::helpers(),
        }
    }
}

/// The contract a template is compiled against, chosen at registration time
#[derive(Debug, Clone)]
pub enum BaseKind {
    /// Model addressed dynamically
    Untyped,
    /// Model with a declared shape
    Typed(ModelShape),
    /// Caller-defined contract
    Custom(CustomContract),
}

impl BaseKind {
    /// Contract for a model type: typed when it declares a shape, untyped otherwise
    pub fn for_model<M: Model>() -> Self {
        match M::shape() {
            Some(shape) => BaseKind::Typed(shape),
            None => BaseKind::Untyped,
        }
    }

    /// Contract for a caller-defined contract type
    pub fn custom<C: TemplateContract>() -> Self {
        BaseKind::Custom(CustomContract::of::<C>())
    }

    /// Namespace of the contract type
    pub fn namespace(&self) -> &str {
        match self {
            BaseKind::Untyped | BaseKind::Typed(_) => RUNTIME_NAMESPACE,
            BaseKind::Custom(contract) => &contract.namespace,
        }
    }

    /// Assembly defining the contract type
    pub fn assembly(&self) -> &str {
        match self {
            BaseKind::Untyped | BaseKind::Typed(_) => RUNTIME_ASSEMBLY,
            BaseKind::Custom(contract) => &contract.assembly,
        }
    }

    /// Reflection-style contract type name
    ///
    /// Generic instantiations use arity notation, e.g.
    /// ``razor.runtime.TemplateBase`1[app.models.Person]``.
    pub fn type_name(&self) -> String {
        match self {
            BaseKind::Untyped => format!("{}.{}", RUNTIME_NAMESPACE, BASE_TYPE_NAME),
            BaseKind::Typed(shape) => format!(
                "{}.{}`1[{}]",
                RUNTIME_NAMESPACE,
                BASE_TYPE_NAME,
                shape.qualified_name()
            ),
            BaseKind::Custom(contract) => format!("{}.{}", contract.namespace, contract.name),
        }
    }

    /// Shape of the bound model, `None` when the model is addressed dynamically
    pub fn model_shape(&self) -> Option<&ModelShape> {
        match self {
            BaseKind::Untyped => None,
            BaseKind::Typed(shape) => Some(shape),
            BaseKind::Custom(contract) => contract.model.as_ref(),
        }
    }

    /// Helpers callable from templates of this contract
    pub fn helpers(&self) -> &[Helper] {
        match self {
            BaseKind::Custom(contract) => &contract.helpers,
            _ => &[],
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            BaseKind::Untyped => "untyped",
            BaseKind::Typed(_) => "typed",
            BaseKind::Custom(_) => "custom",
        }
    }

    /// Check that a model of type `M` can be bound to this contract
    pub fn check_model<M: Model>(&self) -> Result<()> {
        let Some(expected) = self.model_shape() else {
            return Ok(());
        };

        match M::shape() {
            Some(actual) if actual.qualified_name() == expected.qualified_name() => Ok(()),
            Some(actual) => Err(RazorError::Instantiation(format!(
                "contract '{}' expects model '{}' but got '{}'",
                self.type_name(),
                expected.qualified_name(),
                actual.qualified_name()
            ))),
            None => Err(RazorError::Instantiation(format!(
                "contract '{}' expects model '{}' but got an anonymous model",
                self.type_name(),
                expected.qualified_name()
            ))),
        }
    }
}
