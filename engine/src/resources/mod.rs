//! Resource accounting
//!
//! The engine does not measure memory or CPU itself. Measurements come from
//! the host through a [`ResourceSampler`], which the driver queries after
//! every turn. The termination evaluator compares the latest sample against
//! the scope's limits.

use crate::scope::ScopeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Resource counters of one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    /// Memory in megabytes
    pub memory_usage: f64,

    /// CPU time in milliseconds
    pub cpu_time: u64,
}

impl ResourceUsage {
    pub fn new(memory_usage: f64, cpu_time: u64) -> Self {
        Self {
            memory_usage,
            cpu_time,
        }
    }
}

/// Source of live resource measurements
pub trait ResourceSampler: Send + Sync {
    /// Latest measurement for `scope`, `None` to keep the current counters
    fn sample(&self, scope: &ScopeId) -> Option<ResourceUsage>;

    /// Called when a scope is cleaned up
    fn release(&self, _scope: &ScopeId) {}
}

/// Sampler that never reports anything.
///
/// Counters then only change through `ExecutionScope::record_resources`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSampler;

impl ResourceSampler for NoopSampler {
    fn sample(&self, _scope: &ScopeId) -> Option<ResourceUsage> {
        None
    }
}

/// Sampler fed by the host: measurements are pushed with [`report`] and
/// pulled by the engine after each turn.
///
/// [`report`]: HostReportedUsage::report
#[derive(Debug, Default)]
pub struct HostReportedUsage {
    readings: Mutex<HashMap<ScopeId, ResourceUsage>>,
}

impl HostReportedUsage {
    pub fn new() -> Self {
        Self::default()
    }

    fn readings(&self) -> MutexGuard<'_, HashMap<ScopeId, ResourceUsage>> {
        self.readings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the latest measurement for `scope`
    pub fn report(&self, scope: ScopeId, usage: ResourceUsage) {
        self.readings().insert(scope, usage);
    }

    /// Number of scopes with a stored measurement
    pub fn tracked(&self) -> usize {
        self.readings().len()
    }
}

impl ResourceSampler for HostReportedUsage {
    fn sample(&self, scope: &ScopeId) -> Option<ResourceUsage> {
        self.readings().get(scope).copied()
    }

    fn release(&self, scope: &ScopeId) {
        self.readings().remove(scope);
    }
}
