//! Execution scopes
//!
//! An [`ExecutionScope`] is the isolated, bounded context one agent run
//! happens in. It owns everything the run can touch: its validated
//! configuration, its variables, its emitted outputs and its transcript.
//! Nothing in a scope is shared with another scope; the owned containers
//! below are the isolation guarantee.
//!
//! The caller owns the scope value. The engine borrows it mutably for the
//! duration of `execute`, so two turns of one scope can never overlap.

pub mod config;
pub mod emission;
pub mod template;

pub use config::{
    ConstraintOverrides, Constraints, OutputDefinition, ResourceLimitOverrides, ResourceLimits,
    ScopeConfig, ScopeConfiguration,
};
pub use emission::EmittedVariable;

use crate::agent::working_memory::WorkingMemory;
use crate::resources::ResourceUsage;
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Named values visible to prompt interpolation
pub type Variables = BTreeMap<String, Value>;

/// Process-unique scope identifier (random 128-bit token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// Lifecycle state of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeStatus {
    /// Created and registered, never executed
    Initialized,

    /// Turn loop in progress
    Running,

    /// No longer running, whatever the reason
    Completed,
}

impl fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeStatus::Initialized => write!(f, "INITIALIZED"),
            ScopeStatus::Running => write!(f, "RUNNING"),
            ScopeStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Variables owned by one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub variables: Variables,
}

impl ContextState {
    pub fn new(variables: Variables) -> Self {
        Self { variables }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }
}

/// An isolated, bounded execution context for one agent run
#[derive(Debug)]
pub struct ExecutionScope {
    pub(crate) id: ScopeId,
    pub(crate) config: ScopeConfiguration,
    pub(crate) context: ContextState,
    pub(crate) status: ScopeStatus,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) execution_start: Option<Instant>,
    pub(crate) execution_turns: u32,
    pub(crate) resources: ResourceUsage,
    pub(crate) emitted: BTreeMap<String, EmittedVariable>,
    pub(crate) transcript: WorkingMemory,
}

impl ExecutionScope {
    pub(crate) fn new(
        config: ScopeConfiguration,
        variables: Variables,
        transcript_limit: usize,
    ) -> Self {
        Self {
            id: ScopeId::generate(),
            config,
            context: ContextState::new(variables),
            status: ScopeStatus::Initialized,
            created_at: Utc::now(),
            execution_start: None,
            execution_turns: 0,
            resources: ResourceUsage::default(),
            emitted: BTreeMap::new(),
            transcript: WorkingMemory::with_limit(transcript_limit),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn config(&self) -> &ScopeConfiguration {
        &self.config
    }

    pub fn constraints(&self) -> &Constraints {
        &self.config.constraints
    }

    pub fn context(&self) -> &ContextState {
        &self.context
    }

    pub fn status(&self) -> ScopeStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monotonic start of the current execution, `None` before `execute`
    pub fn execution_start(&self) -> Option<Instant> {
        self.execution_start
    }

    pub fn execution_turns(&self) -> u32 {
        self.execution_turns
    }

    pub fn resources(&self) -> &ResourceUsage {
        &self.resources
    }

    pub fn emitted_variables(&self) -> &BTreeMap<String, EmittedVariable> {
        &self.emitted
    }

    /// Conversation carried between turns of the current execution
    pub fn transcript(&self) -> &WorkingMemory {
        &self.transcript
    }

    /// Time spent in the current execution so far
    pub fn elapsed(&self) -> Duration {
        self.execution_start
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    /// Overwrite the resource counters with a host measurement
    pub fn record_resources(&mut self, usage: ResourceUsage) {
        self.resources = usage;
    }

    /// Tighten or relax the constraints of this scope.
    ///
    /// Only fields set in `overrides` change. Takes effect at the next
    /// termination check.
    pub fn update_constraints(&mut self, overrides: ConstraintOverrides) -> Result<(), EngineError> {
        overrides.validate()?;
        overrides.apply_to(&mut self.config.constraints);
        Ok(())
    }

    /// Reset per-execution state and mark the scope as running
    pub(crate) fn begin_execution(&mut self) {
        self.status = ScopeStatus::Running;
        self.execution_start = Some(Instant::now());
        self.execution_turns = 0;
        self.transcript.clear();
    }
}
