//! Subagent SDK
//!
//! Shared library providing the capability traits, types and errors used by
//! the execution engine and by the tool crates that plug into it. Tool
//! authors depend on this crate only.

/// Tool and tool registry traits
pub mod tool;

/// Error types and handling
pub mod errors;

/// Tool argument and error types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use tool::{Tool, ToolRegistry};
pub use types::{ToolArgs, ToolError};
