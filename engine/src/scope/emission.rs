//! Variable emission store
//!
//! Emissions are the named outputs a scope publishes. Each record keeps the
//! value together with when it was emitted and on which turn. The value is
//! mirrored into the scope's variables so later turns can interpolate it.
//! Re-emitting a name replaces the previous record.

use super::ExecutionScope;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One emitted output with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedVariable {
    pub value: Value,

    /// Wall-clock time of the emission
    pub timestamp: DateTime<Utc>,

    /// Value of the scope's turn counter at emission time (0 before execution)
    pub turn: u32,
}

impl ExecutionScope {
    /// Publish a named output value.
    ///
    /// Legal before, during and after execution.
    pub fn emit_variable(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::validation(
                "Variable name must be a non-empty string",
            ));
        }

        if !self.config.output_definitions.is_empty()
            && !self.config.output_definitions.contains_key(name)
        {
            debug!("Scope {} emitted undeclared output '{}'", self.id, name);
        }

        let record = EmittedVariable {
            value: value.clone(),
            timestamp: Utc::now(),
            turn: self.execution_turns,
        };
        self.emitted.insert(name.to_string(), record);
        self.context.insert(name, value);

        debug!(
            "Scope {} emitted '{}' on turn {}",
            self.id, name, self.execution_turns
        );
        Ok(())
    }

    /// The latest emission under `name`
    pub fn emitted(&self, name: &str) -> Option<&EmittedVariable> {
        self.emitted.get(name)
    }
}
