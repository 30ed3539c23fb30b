//! Model access for generated template code
//!
//! Generated code never sees concrete model types. It reads and writes
//! members by name through [`MemberAccess`], which is implemented by:
//! - [`TypedBinding`] for models that declare an identity ([`ModelShape`])
//! - [`AnonymousModel`] for ad hoc shapes, which can also record members the
//!   wrapped value does not have

mod anonymous;

use serde::{Deserialize, Serialize};
use serde_json::Map;

pub use anonymous::AnonymousModel;
pub use serde_json::Value;

use crate::error::{RazorError, Result};

/// A member declared on a typed model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Member name as written in templates (`Model.Name`)
    pub name: String,
    /// Whether generated code may assign the member
    pub settable: bool,
}

/// Declared identity of a typed model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelShape {
    /// Namespace the model type lives in
    pub namespace: String,
    /// Type name
    pub name: String,
    /// Declared members
    pub members: Vec<MemberInfo>,
}

impl ModelShape {
    /// Create a shape with no members
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Declare a settable member
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberInfo {
            name: name.into(),
            settable: true,
        });
        self
    }

    /// Declare a read-only member
    pub fn readonly_member(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberInfo {
            name: name.into(),
            settable: false,
        });
        self
    }

    /// Namespace-qualified type name
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Look up a declared member
    pub fn find_member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// A value that can be bound to a template as its model
///
/// Implement this for caller types to give them an identity through
/// [`Model::shape`]. Types returning `None` are treated as ad hoc shapes and
/// are wrapped in an [`AnonymousModel`] when bound to untyped templates.
pub trait Model: Send + Sync {
    /// Declared identity of this model type, `None` for ad hoc shapes
    fn shape() -> Option<ModelShape>
    where
        Self: Sized;

    /// Current value of the member `name`, `None` if there is no such member
    fn get_member(&self, name: &str) -> Option<Value>;

    /// Write the member `name`
    ///
    /// Returns the value back when there is no settable member called `name`.
    fn set_member(&mut self, name: &str, value: Value) -> Option<Value>;
}

impl Model for Value {
    fn shape() -> Option<ModelShape> {
        None
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        self.as_object().and_then(|fields| fields.get_member(name))
    }

    fn set_member(&mut self, name: &str, value: Value) -> Option<Value> {
        match self.as_object_mut() {
            Some(fields) => fields.set_member(name, value),
            None => Some(value),
        }
    }
}

impl Model for Map<String, Value> {
    fn shape() -> Option<ModelShape> {
        None
    }

    fn get_member(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }

    fn set_member(&mut self, name: &str, value: Value) -> Option<Value> {
        match self.get_mut(name) {
            Some(slot) => {
                *slot = value;
                None
            }
            None => Some(value),
        }
    }
}

impl Model for () {
    fn shape() -> Option<ModelShape> {
        None
    }

    fn get_member(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_member(&mut self, _name: &str, value: Value) -> Option<Value> {
        Some(value)
    }
}

/// Uniform member access used by executing templates
pub trait MemberAccess: Send + Sync {
    /// Read a member
    fn get(&self, name: &str) -> Result<Value>;

    /// Write a member
    fn set(&mut self, name: &str, value: Value) -> Result<()>;
}

/// Direct binding of a model that declares an identity
///
/// Typed models cannot grow members: unknown reads and writes fail with
/// [`RazorError::MissingMember`].
pub struct TypedBinding<'m, M: Model> {
    model: &'m mut M,
}

impl<'m, M: Model> TypedBinding<'m, M> {
    /// Bind a model
    pub fn new(model: &'m mut M) -> Self {
        Self { model }
    }
}

impl<M: Model> MemberAccess for TypedBinding<'_, M> {
    fn get(&self, name: &str) -> Result<Value> {
        self.model
            .get_member(name)
            .ok_or_else(|| RazorError::MissingMember(name.to_string()))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        match self.model.set_member(name, value) {
            None => Ok(()),
            Some(_) => Err(RazorError::MissingMember(name.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Typed model used across unit tests
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Person {
        pub name: String,
        pub age: u32,
    }

    impl Model for Person {
        fn shape() -> Option<ModelShape> {
            Some(
                ModelShape::new("app.models", "Person")
                    .member("Name")
                    .readonly_member("Age"),
            )
        }

        fn get_member(&self, name: &str) -> Option<Value> {
            match name {
                "Name" => Some(json!(self.name)),
                "Age" => Some(json!(self.age)),
                _ => None,
            }
        }

        fn set_member(&mut self, name: &str, value: Value) -> Option<Value> {
            match (name, value) {
                ("Name", Value::String(s)) => {
                    self.name = s;
                    None
                }
                (_, value) => Some(value),
            }
        }
    }

    #[test]
    fn test_shape_qualified_name() {
        let shape = Person::shape().unwrap();
        assert_eq!(shape.qualified_name(), "app.models.Person");
        assert!(shape.find_member("Name").unwrap().settable);
        assert!(!shape.find_member("Age").unwrap().settable);
        assert!(shape.find_member("Missing").is_none());
    }

    #[test]
    fn test_value_model_reads_object_fields() {
        let model = json!({"Name": "Ada"});
        assert_eq!(model.get_member("Name"), Some(json!("Ada")));
        assert_eq!(model.get_member("Other"), None);
        assert!(<Value as Model>::shape().is_none());
    }

    #[test]
    fn test_value_model_writes_existing_fields_only() {
        let mut model = json!({"Name": "Ada"});
        assert_eq!(model.set_member("Name", json!("Grace")), None);
        assert_eq!(model["Name"], json!("Grace"));
        assert_eq!(model.set_member("Count", json!(1)), Some(json!(1)));
        assert!(model.get("Count").is_none());
    }

    #[test]
    fn test_non_object_value_has_no_members() {
        let mut model = json!("plain");
        assert_eq!(model.get_member("len"), None);
        assert_eq!(model.set_member("len", json!(1)), Some(json!(1)));
    }

    #[test]
    fn test_typed_binding_reads_and_writes() {
        let mut person = Person {
            name: "Ada".to_string(),
            age: 36,
        };
        {
            let mut binding = TypedBinding::new(&mut person);
            assert_eq!(binding.get("Age").unwrap(), json!(36));
            binding.set("Name", json!("Grace")).unwrap();
            assert!(matches!(
                binding.get("Missing"),
                Err(RazorError::MissingMember(name)) if name == "Missing"
            ));
            assert!(binding.set("Age", json!(1)).is_err());
        }
        assert_eq!(person.name, "Grace");
    }
}
