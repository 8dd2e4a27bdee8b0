//! Termination evaluation
//!
//! Decides, between turns, whether a running scope must stop and why. Checks
//! run in a fixed precedence order and the first match wins:
//!
//! 1. Resource breach (memory, then CPU time) → `ERROR` / `FAILURE`
//! 2. Turn limit → `MAX_TURNS` / `SUCCESS`
//! 3. Timeout → `TIMEOUT` / `SUCCESS`
//! 4. Caller-supplied [`TerminationCondition`]s in declared order
//!
//! A resource breach means the agent misbehaved and is reported as a
//! failure. Turn limit and timeout are safety valves and end the run
//! gracefully.

pub mod conditions;

pub use conditions::{OutputsEmitted, StopOnEmission};

use crate::scope::ExecutionScope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Why a scope stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationType {
    Completed,
    MaxTurns,
    Timeout,
    Error,
}

/// Whether the stop counts as a success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationStatus {
    Success,
    Failure,
}

/// Structured description of how an execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationRecord {
    #[serde(rename = "type")]
    pub kind: TerminationType,
    pub status: TerminationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub turns_executed: u32,
    pub execution_duration_ms: u64,
}

impl TerminationRecord {
    /// Build a record stamped with the scope's turn count and elapsed time
    pub fn new(
        kind: TerminationType,
        status: TerminationStatus,
        reason: Option<String>,
        scope: &ExecutionScope,
    ) -> Self {
        Self {
            kind,
            status,
            reason,
            turns_executed: scope.execution_turns(),
            execution_duration_ms: u64::try_from(scope.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn completed(scope: &ExecutionScope) -> Self {
        Self::new(TerminationType::Completed, TerminationStatus::Success, None, scope)
    }

    /// Completed with an explanation (used by custom conditions)
    pub fn completed_because(scope: &ExecutionScope, reason: impl Into<String>) -> Self {
        Self::new(
            TerminationType::Completed,
            TerminationStatus::Success,
            Some(reason.into()),
            scope,
        )
    }

    pub fn max_turns(scope: &ExecutionScope) -> Self {
        Self::new(TerminationType::MaxTurns, TerminationStatus::Success, None, scope)
    }

    pub fn timeout(scope: &ExecutionScope) -> Self {
        Self::new(TerminationType::Timeout, TerminationStatus::Success, None, scope)
    }

    pub fn error(scope: &ExecutionScope, reason: impl Into<String>) -> Self {
        Self::new(
            TerminationType::Error,
            TerminationStatus::Failure,
            Some(reason.into()),
            scope,
        )
    }

    pub fn execution_duration(&self) -> Duration {
        Duration::from_millis(self.execution_duration_ms)
    }

    pub fn is_success(&self) -> bool {
        self.status == TerminationStatus::Success
    }
}

/// Caller-supplied stop predicate, evaluated after the built-in checks
pub trait TerminationCondition: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Return a record to stop the scope, `None` to let it continue
    fn check(&self, scope: &ExecutionScope) -> Option<TerminationRecord>;
}

impl fmt::Debug for dyn TerminationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TerminationCondition").field(&self.name()).finish()
    }
}

/// How the turn counter is compared against `max_turns`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnLimit {
    /// Stop once the counter is past the limit
    Exceeded,
    /// Stop once no turn of the budget is left
    Exhausted,
}

/// Evaluate whether `scope` must stop.
///
/// Turns count as exhausted only once `turns > max_turns`. The execution
/// driver stops as soon as `turns == max_turns`, so a scope that ended as
/// `MAX_TURNS` reports `None` here afterwards.
pub fn check_termination(scope: &ExecutionScope) -> Option<TerminationRecord> {
    evaluate(scope, TurnLimit::Exceeded)
}

pub(crate) fn evaluate(scope: &ExecutionScope, turn_limit: TurnLimit) -> Option<TerminationRecord> {
    let constraints = scope.constraints();
    let limits = &constraints.resource_limits;
    let usage = scope.resources();

    if usage.memory_usage > limits.max_memory_mb {
        let reason = format!(
            "Memory limit exceeded: {}MB > {}MB",
            usage.memory_usage, limits.max_memory_mb
        );
        warn!("Scope {}: {}", scope.id(), reason);
        return Some(TerminationRecord::error(scope, reason));
    }

    if usage.cpu_time > limits.max_cpu_time_ms {
        let reason = format!(
            "CPU time limit exceeded: {}ms > {}ms",
            usage.cpu_time, limits.max_cpu_time_ms
        );
        warn!("Scope {}: {}", scope.id(), reason);
        return Some(TerminationRecord::error(scope, reason));
    }

    let turns = scope.execution_turns();
    let turns_hit = match turn_limit {
        TurnLimit::Exceeded => turns > constraints.max_turns,
        TurnLimit::Exhausted => turns >= constraints.max_turns,
    };
    if turns_hit {
        return Some(TerminationRecord::max_turns(scope));
    }

    if scope.execution_start().is_some() && scope.elapsed() > constraints.timeout() {
        return Some(TerminationRecord::timeout(scope));
    }

    constraints
        .termination_conditions
        .iter()
        .find_map(|condition| condition.check(scope))
}
