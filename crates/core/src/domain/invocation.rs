// Job Invocation Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Method names that collide with job definition capabilities
pub const RESERVED_METHOD_NAMES: &[&str] = &[
    "now",
    "later",
    "execute",
    "consume_messages",
    "scheduler",
    "consumer",
];

/// Positional + keyword arguments for a job method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keyword: Map::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get_keyword(&self, key: &str) -> Option<&Value> {
        self.keyword.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// A scheduled call of `handler_id.method(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub handler_id: String,
    pub method: Option<String>,
    pub arguments: Arguments,
}

impl Invocation {
    pub fn new(handler_id: impl Into<String>, method: Option<String>, arguments: Arguments) -> Self {
        Self {
            handler_id: handler_id.into(),
            method,
            arguments,
        }
    }
}

/// Check a job method name against the reserved set
pub fn check_method_name(method: &str) -> super::error::Result<()> {
    if RESERVED_METHOD_NAMES.contains(&method) {
        return Err(super::DomainError::ReservedIdentifier(method.to_string()));
    }
    Ok(())
}
