//! Error types and handling
//!
//! This module provides the error taxonomy of the execution engine. Every
//! variant describes a caller or tool-author mistake and is therefore raised,
//! never folded into a termination record. Bounded stopping conditions
//! (timeouts, turn limits, resource breaches) are data, not errors, and do
//! not appear here.
//!
//! All errors implement [`EngineErrorExt`], which provides a user-facing hint
//! and tells whether retrying can help.

use thiserror::Error;

/// Trait for engine error extensions
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error.
    ///
    /// The hint never contains tool arguments, variable values or prompts.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable.
    ///
    /// Recoverable errors can be fixed by the caller and retried. Others
    /// indicate a broken deployment (bad configuration file) and need manual
    /// intervention.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::PermissionDenied("Write".to_string());
/// assert_eq!(error.to_string(), "Tool 'Write' not permitted for this SubAgent");
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Tool gate errors
    #[error("Tool '{0}' not permitted for this SubAgent")]
    PermissionDenied(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // Registry errors
    #[error("Scope capacity exceeded: {live}/{limit} scopes are live")]
    ScopeCapacityExceeded { live: usize, limit: usize },

    #[error("Scope id collision: {0}")]
    ScopeIdCollision(String),
}

impl EngineError {
    /// Shorthand for [`EngineError::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Validation(_) => "Check the scope configuration and variable names",
            Self::Config(_) => "Check your engine.toml file for errors",
            Self::PermissionDenied(_) => {
                "Add the tool to toolPermissions or remove it from the agent's reach"
            }
            Self::ToolNotFound(_) => "The requested tool is not registered",
            Self::ScopeCapacityExceeded { .. } => {
                "Too many live scopes. Clean up finished scopes before starting new ones"
            }
            Self::ScopeIdCollision(_) => "Scope creation failed. Try again",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}
