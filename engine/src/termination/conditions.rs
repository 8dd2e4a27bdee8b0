//! Built-in termination conditions

use super::{TerminationCondition, TerminationRecord};
use crate::scope::ExecutionScope;

/// Stops once every declared output has been emitted.
///
/// Never fires for scopes without output definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputsEmitted;

impl TerminationCondition for OutputsEmitted {
    fn name(&self) -> &str {
        "outputs_emitted"
    }

    fn check(&self, scope: &ExecutionScope) -> Option<TerminationRecord> {
        let declared = &scope.config().output_definitions;
        if declared.is_empty() {
            return None;
        }

        let emitted = scope.emitted_variables();
        declared
            .keys()
            .all(|name| emitted.contains_key(name))
            .then(|| TerminationRecord::completed_because(scope, "All declared outputs emitted"))
    }
}

/// Stops as soon as a named variable has been emitted
#[derive(Debug, Clone)]
pub struct StopOnEmission {
    variable: String,
}

impl StopOnEmission {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

impl TerminationCondition for StopOnEmission {
    fn name(&self) -> &str {
        "stop_on_emission"
    }

    fn check(&self, scope: &ExecutionScope) -> Option<TerminationRecord> {
        scope.emitted(&self.variable).map(|_| {
            TerminationRecord::completed_because(
                scope,
                format!("Variable '{}' emitted", self.variable),
            )
        })
    }
}
