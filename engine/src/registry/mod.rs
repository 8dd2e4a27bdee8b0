//! Scope registry
//!
//! Tracks every scope between successful initialization and cleanup. The
//! registry only stores bookkeeping keyed by [`ScopeId`]; the scopes
//! themselves stay with their callers. Inserts and removals touch a single
//! unique key, so scopes never contend with each other here.

use crate::scope::ScopeId;
use chrono::{DateTime, TimeDelta, Utc};
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Bookkeeping kept per live scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub registered_at: DateTime<Utc>,
}

impl RegistryEntry {
    /// Time since registration
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.registered_at
    }
}

/// Registry of live scopes
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    entries: Mutex<HashMap<ScopeId, RegistryEntry>>,
    capacity: Option<usize>,
}

impl ScopeRegistry {
    /// Create an unbounded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that refuses more than `capacity` live scopes
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ScopeId, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new scope
    pub fn register(&self, id: ScopeId) -> Result<(), EngineError> {
        let mut entries = self.entries();

        if let Some(limit) = self.capacity {
            if entries.len() >= limit {
                warn!("Scope capacity reached ({}/{})", entries.len(), limit);
                return Err(EngineError::ScopeCapacityExceeded {
                    live: entries.len(),
                    limit,
                });
            }
        }

        if entries.contains_key(&id) {
            return Err(EngineError::ScopeIdCollision(id.to_string()));
        }

        entries.insert(
            id,
            RegistryEntry {
                registered_at: Utc::now(),
            },
        );
        debug!("Registered {} ({} live)", id, entries.len());
        Ok(())
    }

    /// Remove a scope, returning its entry when it was registered
    pub fn remove(&self, id: &ScopeId) -> Option<RegistryEntry> {
        let mut entries = self.entries();
        let removed = entries.remove(id);
        if let Some(entry) = &removed {
            debug!(
                "Unregistered {} after {}ms ({} live)",
                id,
                entry.age().num_milliseconds(),
                entries.len()
            );
        }
        removed
    }

    pub fn contains(&self, id: &ScopeId) -> bool {
        self.entries().contains_key(id)
    }

    /// Number of scopes not yet cleaned up
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
