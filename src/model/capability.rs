use indexmap::IndexMap;
use serde::Serialize;

use crate::model::PropertyValue;

/// A named, typed assertion a resource advertises — "I provide package X at
/// version Y". The namespace (`package`, `bundle`, `service`, `fragment`,
/// `ee`) ties it to the requirements that can match it.
///
/// Compared by value only; a capability has no identity of its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capability {
    name: String,
    properties: IndexMap<String, Vec<PropertyValue>>,
}

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a value; repeating a key accumulates into its value list.
    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.add_property(key, value);
        self
    }

    pub fn properties(&self) -> &IndexMap<String, Vec<PropertyValue>> {
        &self.properties
    }

    /// Case-insensitive lookup, same as the filter evaluator uses.
    pub fn property(&self, key: &str) -> Option<&[PropertyValue]> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
    }
}
