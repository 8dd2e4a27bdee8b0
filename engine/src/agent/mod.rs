//! Agent execution
//!
//! The [`ScopeEngine`] runs the bounded turn loop of a scope. Each scope
//! carries its own [`WorkingMemory`] transcript between turns.

pub mod core;
pub mod working_memory;

pub use core::{ExecutionResult, ScopeEngine};
pub use working_memory::WorkingMemory;
