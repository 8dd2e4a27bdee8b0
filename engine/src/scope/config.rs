//! Scope configuration: caller input, validation and default resolution
//!
//! [`ScopeConfig`] is what a caller hands to the engine. Every constraint in
//! it is optional. [`ScopeConfig::resolve`] validates it and fills each
//! missing field independently from the engine's
//! [`ConstraintDefaults`], producing the [`ScopeConfiguration`] a scope
//! owns.
//!
//! JSON input uses camelCase keys:
//!
//! ```json
//! {
//!   "prompt": "Summarise {{topic}}",
//!   "toolPermissions": ["Read"],
//!   "outputDefinitions": {"summary": {"type": "string"}},
//!   "constraints": {"timeoutMs": 5000, "maxTurns": 3,
//!                   "resourceLimits": {"maxMemoryMB": 64}}
//! }
//! ```

use crate::config::ConstraintDefaults;
use crate::termination::TerminationCondition;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Declared output of a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDefinition {
    /// Free-form type tag ("string", "number", "object", ...)
    #[serde(rename = "type", default = "default_output_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OutputDefinition {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn default_output_type() -> String {
    "any".to_string()
}

/// Partial resource limits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimitOverrides {
    #[serde(rename = "maxMemoryMB", default)]
    pub max_memory_mb: Option<f64>,

    #[serde(default)]
    pub max_cpu_time_ms: Option<u64>,
}

/// Partial constraints: `None` means "use the default" (or "keep the current
/// value" when applied through `update_constraints`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintOverrides {
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub max_turns: Option<u32>,

    #[serde(default)]
    pub resource_limits: ResourceLimitOverrides,

    /// Replaces the whole condition list when set
    #[serde(skip)]
    pub termination_conditions: Option<Vec<Arc<dyn TerminationCondition>>>,
}

impl ConstraintOverrides {
    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        if self.timeout_ms == Some(0) {
            return Err(EngineError::validation("timeoutMs must be greater than 0"));
        }
        if self.max_turns == Some(0) {
            return Err(EngineError::validation("maxTurns must be greater than 0"));
        }
        if let Some(memory) = self.resource_limits.max_memory_mb {
            if memory <= 0.0 || !memory.is_finite() {
                return Err(EngineError::validation(
                    "resourceLimits.maxMemoryMB must be a positive number",
                ));
            }
        }
        if self.resource_limits.max_cpu_time_ms == Some(0) {
            return Err(EngineError::validation(
                "resourceLimits.maxCpuTimeMs must be greater than 0",
            ));
        }
        Ok(())
    }

    pub(crate) fn apply_to(self, constraints: &mut Constraints) {
        if let Some(timeout_ms) = self.timeout_ms {
            constraints.timeout_ms = timeout_ms;
        }
        if let Some(max_turns) = self.max_turns {
            constraints.max_turns = max_turns;
        }
        if let Some(memory) = self.resource_limits.max_memory_mb {
            constraints.resource_limits.max_memory_mb = memory;
        }
        if let Some(cpu) = self.resource_limits.max_cpu_time_ms {
            constraints.resource_limits.max_cpu_time_ms = cpu;
        }
        if let Some(conditions) = self.termination_conditions {
            constraints.termination_conditions = conditions;
        }
    }
}

/// Resolved resource ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: f64,
    pub max_cpu_time_ms: u64,
}

/// Resolved constraints of a scope
#[derive(Debug, Clone)]
pub struct Constraints {
    pub timeout_ms: u64,
    pub max_turns: u32,
    /// Evaluated in declared order after the built-in checks
    pub termination_conditions: Vec<Arc<dyn TerminationCondition>>,
    pub resource_limits: ResourceLimits,
}

impl Constraints {
    pub fn from_defaults(defaults: &ConstraintDefaults) -> Self {
        Self {
            timeout_ms: defaults.timeout_ms,
            max_turns: defaults.max_turns,
            termination_conditions: Vec::new(),
            resource_limits: ResourceLimits {
                max_memory_mb: defaults.max_memory_mb,
                max_cpu_time_ms: defaults.max_cpu_time_ms,
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Caller-supplied scope configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
    /// Prompt template with `{{var}}` placeholders
    pub prompt: String,

    /// Opaque settings handed to the LLM client
    #[serde(default)]
    pub model_settings: Value,

    #[serde(default)]
    pub tool_permissions: Vec<String>,

    #[serde(default)]
    pub output_definitions: BTreeMap<String, OutputDefinition>,

    #[serde(default)]
    pub constraints: ConstraintOverrides,
}

impl ScopeConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_model_settings(mut self, settings: Value) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn with_tool_permissions<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_permissions = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, definition: OutputDefinition) -> Self {
        self.output_definitions.insert(name.into(), definition);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.constraints.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.constraints.max_turns = Some(max_turns);
        self
    }

    pub fn with_memory_limit_mb(mut self, max_memory_mb: f64) -> Self {
        self.constraints.resource_limits.max_memory_mb = Some(max_memory_mb);
        self
    }

    pub fn with_cpu_time_limit_ms(mut self, max_cpu_time_ms: u64) -> Self {
        self.constraints.resource_limits.max_cpu_time_ms = Some(max_cpu_time_ms);
        self
    }

    pub fn with_termination_condition(mut self, condition: Arc<dyn TerminationCondition>) -> Self {
        self.constraints
            .termination_conditions
            .get_or_insert_with(Vec::new)
            .push(condition);
        self
    }

    /// Parse a raw JSON configuration.
    ///
    /// Rejects `null`, non-objects, the empty object, a missing, empty or
    /// non-string `prompt`, a `toolPermissions` that is present but not an
    /// array, and a `constraints` that is present but not an object. `null`
    /// fields count as absent.
    pub fn from_json(raw: &Value) -> Result<Self, EngineError> {
        let object = match raw {
            Value::Object(map) if !map.is_empty() => map,
            _ => {
                return Err(EngineError::validation(
                    "Configuration is required and must be a non-empty object",
                ))
            }
        };

        match object.get("prompt") {
            Some(Value::String(prompt)) if !prompt.is_empty() => {}
            _ => {
                return Err(EngineError::validation(
                    "Prompt is required and must be a non-empty string",
                ))
            }
        }

        if let Some(tools) = object.get("toolPermissions") {
            if !tools.is_array() && !tools.is_null() {
                return Err(EngineError::validation("toolPermissions must be an array"));
            }
        }

        if let Some(constraints) = object.get("constraints") {
            if !constraints.is_object() && !constraints.is_null() {
                return Err(EngineError::validation("constraints must be an object"));
            }
        }

        let cleaned = strip_nulls(raw.clone());
        serde_json::from_value(cleaned)
            .map_err(|e| EngineError::validation(format!("Invalid configuration: {}", e)))
    }

    /// Validate and fill omitted constraint fields from `defaults`
    pub fn resolve(self, defaults: &ConstraintDefaults) -> Result<ScopeConfiguration, EngineError> {
        if self.prompt.is_empty() {
            return Err(EngineError::validation(
                "Prompt is required and must be a non-empty string",
            ));
        }
        if self.tool_permissions.iter().any(|name| name.is_empty()) {
            return Err(EngineError::validation(
                "toolPermissions entries must be non-empty tool names",
            ));
        }
        self.constraints.validate()?;

        let mut constraints = Constraints::from_defaults(defaults);
        self.constraints.apply_to(&mut constraints);

        Ok(ScopeConfiguration {
            prompt: self.prompt,
            model_settings: self.model_settings,
            tool_permissions: self.tool_permissions.into_iter().collect(),
            output_definitions: self.output_definitions,
            constraints,
        })
    }
}

/// Remove `null` members of the top-level object, of `constraints` and of
/// `constraints.resourceLimits`. `modelSettings` is left untouched.
fn strip_nulls(mut raw: Value) -> Value {
    fn retain_non_null(value: &mut Value) {
        if let Value::Object(map) = value {
            map.retain(|_, v| !v.is_null());
        }
    }

    retain_non_null(&mut raw);
    if let Some(constraints) = raw.get_mut("constraints") {
        retain_non_null(constraints);
        if let Some(limits) = constraints.get_mut("resourceLimits") {
            retain_non_null(limits);
        }
    }
    raw
}

/// Validated configuration owned by exactly one scope
#[derive(Debug, Clone)]
pub struct ScopeConfiguration {
    pub prompt: String,
    pub model_settings: Value,
    pub tool_permissions: BTreeSet<String>,
    pub output_definitions: BTreeMap<String, OutputDefinition>,
    pub constraints: Constraints,
}

impl ScopeConfiguration {
    /// Whether the scope may invoke `tool`
    pub fn permits(&self, tool: &str) -> bool {
        self.tool_permissions.contains(tool)
    }
}
