//! Tool capability traits
//!
//! Tools are supplied by the host, never implemented by the engine. The engine
//! only sees two seams: a [`Tool`] that can be executed with JSON arguments,
//! and a [`ToolRegistry`] that resolves tool names to tools.

use crate::types::{ToolArgs, ToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Trait that all tools must implement
///
/// `execute` is a suspension point: the engine awaits it and other scopes'
/// turns may run in the meantime. Implementations must therefore be safe to
/// call concurrently from several scopes.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name the model uses to request this tool
    fn name(&self) -> &str;

    /// Short human-readable description advertised to the model
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool.
    ///
    /// Errors are returned to the engine's caller unchanged.
    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError>;
}

/// Name-based lookup of tools
pub trait ToolRegistry: Send + Sync {
    /// Resolve a tool by name, `None` when nothing is registered under it
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;
}

impl<R: ToolRegistry + ?Sized> ToolRegistry for Arc<R> {
    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        (**self).get_tool(name)
    }
}
