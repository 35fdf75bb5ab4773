//! Ordered deployment parameter sets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A deployment parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// A boolean value.
    Bool(bool),
    /// A string value.
    String(String),
}

impl ParameterValue {
    /// Converts a JSON value from a parameters file.
    ///
    /// Strings and booleans keep their type; anything else is rendered to
    /// its JSON text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }

    /// Builds a value from override text, keeping boolean parameters boolean.
    #[must_use]
    pub fn from_override(text: String, existing: Option<&Self>) -> Self {
        if let Some(Self::Bool(_)) = existing {
            if text.eq_ignore_ascii_case("true") {
                return Self::Bool(true);
            }
            if text.eq_ignore_ascii_case("false") {
                return Self::Bool(false);
            }
        }
        Self::String(text)
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Bool(_) => None,
        }
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ParameterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A named parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, unique within a set.
    pub name: String,
    /// Parameter value.
    pub value: ParameterValue,
}

impl Parameter {
    /// Creates a new parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered set of uniquely named parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: Vec<Parameter>,
}

impl ParameterSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the set has no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.position(name).map(|i| &self.entries[i].value)
    }

    /// Returns true if `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterates over the parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.iter()
    }

    /// Returns parameter names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|p| p.name.as_str()).collect()
    }

    /// Sets `name` to `value`, keeping its position if present, appending
    /// otherwise.
    pub fn upsert(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].value = value,
            None => self.entries.push(Parameter { name, value }),
        }
    }

    /// Sets `name` to `value`, keeping its position if present, inserting
    /// at the front otherwise.
    ///
    /// Used to force required parameters ahead of user-supplied ones.
    pub fn replace(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => self.entries[i].value = value,
            None => self.entries.insert(0, Parameter { name, value }),
        }
    }

    /// Renders the `{ name: { "value": v } }` object submitted with a
    /// deployment.
    #[must_use]
    pub fn to_deployment_parameters(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|p| {
                let mut wrapper = Map::new();
                wrapper.insert("value".to_string(), p.value.to_json());
                (p.name.clone(), Value::Object(wrapper))
            })
            .collect();
        Value::Object(map)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|p| p.name == name)
    }
}

impl FromIterator<Parameter> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut set = Self::new();
        for p in iter {
            set.upsert(p.name, p.value);
        }
        set
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
