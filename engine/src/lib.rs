//! Subagent Engine Library
//!
//! Bounded execution of AI sub-agents. Each run happens inside an isolated
//! [`ExecutionScope`] with its own variables, tool permissions, emitted
//! outputs and limits on turns, wall-clock time and resources. The model
//! backend and the tools are injected by the host.
//!
//! ```no_run
//! # async fn demo(client: std::sync::Arc<dyn subagent_engine::llm::LLMClient>) -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use subagent_engine::{EngineConfig, ScopeConfig, ScopeEngine, ToolSet, Variables};
//!
//! let engine = ScopeEngine::new(EngineConfig::default(), client, Arc::new(ToolSet::new()));
//! let result = engine
//!     .run(ScopeConfig::new("Summarise {{topic}}").with_max_turns(5), Variables::new())
//!     .await?;
//! println!("{:?}", result.termination.kind);
//! # Ok(())
//! # }
//! ```

/// Agent turn loop and per-scope transcript
pub mod agent;

/// Configuration management module
pub mod config;

/// AI client contract
pub mod llm;

/// Live scope bookkeeping
pub mod registry;

/// Resource accounting and sampling
pub mod resources;

/// Execution scopes, their configuration and emissions
pub mod scope;

/// Telemetry and Observability
pub mod telemetry;

/// Termination evaluation
pub mod termination;

/// Tool registration and permission gate
pub mod tools;

pub use agent::{ExecutionResult, ScopeEngine};
pub use config::EngineConfig;
pub use resources::{HostReportedUsage, ResourceSampler, ResourceUsage};
pub use scope::{ExecutionScope, ScopeConfig, ScopeId, ScopeStatus, Variables};
pub use termination::{
    check_termination, TerminationCondition, TerminationRecord, TerminationStatus,
    TerminationType,
};
pub use tools::ToolSet;
