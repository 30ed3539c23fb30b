//! Adapter for models without a declared identity

use std::collections::HashMap;

use crate::{
    error::{RazorError, Result},
    model::{MemberAccess, Model, Value},
};

/// Wraps an ad hoc model so templates can read its members and record new ones
///
/// Reads go to the wrapped value first, then to members recorded by earlier
/// writes. Writes go to the wrapped value when it has a settable member of
/// that name, otherwise they are recorded on the adapter.
pub struct AnonymousModel<'m, M: Model> {
    inner: &'m mut M,
    custom_members: HashMap<String, Value>,
}

impl<'m, M: Model> AnonymousModel<'m, M> {
    /// Wrap a model
    pub fn new(inner: &'m mut M) -> Self {
        Self {
            inner,
            custom_members: HashMap::new(),
        }
    }

    /// Members recorded by writes the wrapped value could not take
    pub fn custom_members(&self) -> &HashMap<String, Value> {
        &self.custom_members
    }

    /// Release the wrapped model, keeping the recorded members
    pub fn into_custom_members(self) -> HashMap<String, Value> {
        self.custom_members
    }
}

impl<M: Model> MemberAccess for AnonymousModel<'_, M> {
    fn get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.inner.get_member(name) {
            return Ok(value);
        }

        self.custom_members
            .get(name)
            .cloned()
            .ok_or_else(|| RazorError::MissingMember(name.to_string()))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<()> {
        if let Some(value) = self.inner.set_member(name, value) {
            self.custom_members.insert(name.to_string(), value);
        }
        Ok(())
    }
}
