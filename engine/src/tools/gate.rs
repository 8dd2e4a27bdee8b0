//! Tool permission gate
//!
//! Every tool call the model requests passes through here, in order:
//!
//! 1. Permission: the tool must be listed in the scope's `toolPermissions`
//! 2. Resolution: the registry must know the tool
//! 3. Execution: the tool runs with the requested arguments
//!
//! The first failure aborts the remaining calls of the batch. Tool errors
//! are returned unchanged so callers can downcast to [`ToolError`].
//!
//! [`EMIT_VARIABLE_TOOL`] is built in: it needs no permission, never reaches
//! the registry and publishes `{name, value}` into the scope's emissions on
//! the current turn.
//!
//! [`ToolError`]: sdk::types::ToolError

use crate::llm::ToolCall;
use crate::scope::{ExecutionScope, ScopeConfiguration};
use anyhow::Result;
use sdk::errors::EngineError;
use sdk::tool::ToolRegistry;
use sdk::types::ToolArgs;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Prefix of the context keys tool results are stored under
pub const TOOL_RESULT_PREFIX: &str = "tool:";

/// Built-in tool publishing a named output of the scope
pub const EMIT_VARIABLE_TOOL: &str = "emit_variable";

/// Context key holding the latest result of `tool`
pub fn tool_result_key(tool: &str) -> String {
    format!("{}{}", TOOL_RESULT_PREFIX, tool)
}

/// Result of one successful tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool: String,
    pub result: Value,
}

/// Check that `config` allows `tool`
pub fn authorize(config: &ScopeConfiguration, tool: &str) -> Result<(), EngineError> {
    if config.permits(tool) {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied(tool.to_string()))
    }
}

/// Run `calls` sequentially on behalf of `scope`.
///
/// Each result is written into the scope's variables under
/// [`tool_result_key`] before the next call starts.
pub async fn dispatch(
    registry: &dyn ToolRegistry,
    scope: &mut ExecutionScope,
    calls: &[ToolCall],
) -> Result<Vec<ToolOutcome>> {
    let mut outcomes = Vec::with_capacity(calls.len());

    for call in calls {
        if call.name == EMIT_VARIABLE_TOOL {
            outcomes.push(emit(scope, call)?);
            continue;
        }

        if let Err(e) = authorize(scope.config(), &call.name) {
            warn!("Scope {}: {}", scope.id(), e);
            return Err(e.into());
        }

        let Some(tool) = registry.get_tool(&call.name) else {
            warn!("Scope {}: tool '{}' is not registered", scope.id(), call.name);
            return Err(EngineError::ToolNotFound(call.name.clone()).into());
        };

        debug!(
            "Scope {} turn {}: calling '{}' ({})",
            scope.id(),
            scope.execution_turns(),
            call.name,
            call.id
        );

        let args = ToolArgs::from_value(call.arguments.clone());
        let result = match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Scope {}: tool '{}' failed: {}", scope.id(), call.name, e);
                return Err(e.into());
            }
        };

        scope
            .context
            .insert(tool_result_key(&call.name), result.clone());
        outcomes.push(ToolOutcome {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            result,
        });
    }

    Ok(outcomes)
}

fn emit(scope: &mut ExecutionScope, call: &ToolCall) -> Result<ToolOutcome, EngineError> {
    let args = ToolArgs::from_value(call.arguments.clone());
    let name = args
        .param_str("name")
        .map_err(|e| EngineError::validation(format!("{}: {}", EMIT_VARIABLE_TOOL, e)))?;
    let value = args.param_json("value").cloned().unwrap_or(Value::Null);

    scope.emit_variable(name, value)?;
    Ok(ToolOutcome {
        call_id: call.id.clone(),
        tool: EMIT_VARIABLE_TOOL.to_string(),
        result: json!({ "emitted": name }),
    })
}
