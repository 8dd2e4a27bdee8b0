//! Tool argument and error types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments passed to a tool invocation.
///
/// Always a JSON object. Anything else the model sends (a bare string, an
/// array, `null`) is wrapped or discarded by [`ToolArgs::from_value`] so tools
/// never have to handle a non-object payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArgs {
    params: Map<String, Value>,
}

impl ToolArgs {
    /// Create an empty argument object
    pub fn new() -> Self {
        Self::default()
    }

    /// Build arguments from an arbitrary JSON value.
    ///
    /// Objects are taken as-is, `null` becomes an empty object and any other
    /// value is stored under the `"input"` key.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(params) => Self { params },
            Value::Null => Self::default(),
            other => {
                let mut params = Map::new();
                params.insert("input".to_string(), other);
                Self { params }
            }
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a string parameter
    pub fn param_str(&self, key: &str) -> Result<&str, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get a bool parameter
    pub fn param_bool(&self, key: &str) -> Result<bool, ToolError> {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Get a parameter as a JSON value
    pub fn param_json(&self, key: &str) -> Result<&Value, ToolError> {
        self.params
            .get(key)
            .ok_or_else(|| ToolError::MissingParameter(key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Consume the arguments, returning the underlying JSON object
    pub fn into_value(self) -> Value {
        Value::Object(self.params)
    }
}

impl From<Value> for ToolArgs {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Tool-specific errors.
///
/// These are raised by tool implementations and travel through the engine
/// untouched: the caller of `execute` receives the same variant and message
/// the tool produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Tool timed out after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    /// Shorthand for [`ToolError::ExecutionFailed`]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }
}
