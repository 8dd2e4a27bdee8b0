//! Scope Engine
//!
//! Drives bounded agent runs. Each run happens inside an [`ExecutionScope`]
//! and loops through turns:
//!
//! 1. Increment the turn counter
//! 2. Render the prompt from the scope's variables and call the LLM client
//! 3. Dispatch requested tool calls through the permission gate; the
//!    built-in `emit_variable` call publishes outputs on the current turn
//! 4. Stop as `COMPLETED` when the model asked for no tool
//! 5. Refresh resource counters and evaluate termination
//!
//! # Limits
//!
//! Turn budget, wall-clock timeout and resource ceilings are all checked
//! between turns only. An in-flight LLM or tool call always finishes before
//! a stop is acted upon.
//!
//! # Errors
//!
//! Bounded stops come back as a [`TerminationRecord`]. Permission
//! violations, unknown tools, tool failures and LLM failures are returned as
//! errors and leave the scope registered until [`ScopeEngine::cleanup`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::llm::{LLMClient, Message, ToolSpec};
use crate::registry::ScopeRegistry;
use crate::resources::{NoopSampler, ResourceSampler};
use crate::scope::template;
use crate::scope::{
    ContextState, EmittedVariable, ExecutionScope, ScopeConfig, ScopeConfiguration, ScopeId,
    ScopeStatus, Variables,
};
use crate::termination::{self, TerminationRecord, TurnLimit};
use crate::tools;
use sdk::errors::EngineError;
use sdk::tool::ToolRegistry;

/// Outcome of one `execute` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub scope_id: ScopeId,
    pub termination: TerminationRecord,
    /// Snapshot of the emissions at the end of the run
    pub emitted_variables: BTreeMap<String, EmittedVariable>,
    /// Snapshot of the scope's variables at the end of the run
    pub final_context: ContextState,
}

impl ExecutionResult {
    fn snapshot(scope: &ExecutionScope, termination: TerminationRecord) -> Self {
        Self {
            scope_id: scope.id(),
            termination,
            emitted_variables: scope.emitted_variables().clone(),
            final_context: scope.context().clone(),
        }
    }
}

/// Execution engine for bounded agent scopes
pub struct ScopeEngine {
    config: EngineConfig,
    client: Arc<dyn LLMClient>,
    tools: Arc<dyn ToolRegistry>,
    sampler: Arc<dyn ResourceSampler>,
    registry: ScopeRegistry,
}

impl ScopeEngine {
    /// Create an engine without resource sampling
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn LLMClient>,
        tools: Arc<dyn ToolRegistry>,
    ) -> Self {
        let registry = ScopeRegistry::with_capacity(config.scope_capacity());
        Self {
            config,
            client,
            tools,
            sampler: Arc::new(NoopSampler),
            registry,
        }
    }

    /// Use `sampler` to refresh resource counters after every turn
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Number of scopes initialized and not yet cleaned up
    pub fn live_scopes(&self) -> usize {
        self.registry.len()
    }

    /// Validate `config`, build a scope owning `initial_context` and register it.
    ///
    /// Pure construction: no I/O, no LLM or tool calls. On error nothing is
    /// registered.
    pub fn initialize_scope(
        &self,
        config: ScopeConfig,
        initial_context: Variables,
    ) -> Result<ExecutionScope, EngineError> {
        let config = config.resolve(&self.config.defaults)?;
        let scope = ExecutionScope::new(
            config,
            initial_context,
            self.config.transcript.context_limit_tokens,
        );

        self.registry.register(scope.id())?;

        info!(
            "Initialized {} (max_turns={}, timeout={}ms, tools={})",
            scope.id(),
            scope.constraints().max_turns,
            scope.constraints().timeout_ms,
            scope.config().tool_permissions.len()
        );
        Ok(scope)
    }

    /// [`initialize_scope`](Self::initialize_scope) for raw JSON input.
    ///
    /// `initial_context` must be an object when given; `null` counts as
    /// absent.
    pub fn initialize_scope_from_json(
        &self,
        config: &Value,
        initial_context: Option<&Value>,
    ) -> Result<ExecutionScope, EngineError> {
        let config = ScopeConfig::from_json(config)?;
        let variables = match initial_context {
            None | Some(Value::Null) => Variables::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Some(_) => {
                return Err(EngineError::validation(
                    "Initial context must be an object",
                ))
            }
        };
        self.initialize_scope(config, variables)
    }

    /// Run the turn loop of `scope` until it terminates.
    ///
    /// Every call starts a fresh execution: the clock, the turn counter and
    /// the transcript are reset, variables and emissions are kept. The scope
    /// is `COMPLETED` afterwards whether the run stopped or failed.
    pub async fn execute(&self, scope: &mut ExecutionScope) -> Result<ExecutionResult> {
        if !self.registry.contains(&scope.id()) {
            return Err(EngineError::validation(format!(
                "{} is not registered; it was cleaned up or belongs to another engine",
                scope.id()
            ))
            .into());
        }

        scope.begin_execution();
        info!("Executing {} with '{}'", scope.id(), self.client.name());

        let outcome = self.run_turns(scope).await;
        scope.status = ScopeStatus::Completed;

        match outcome {
            Ok(termination) => {
                info!(
                    "{} stopped: {:?}/{:?} after {} turns in {}ms",
                    scope.id(),
                    termination.kind,
                    termination.status,
                    termination.turns_executed,
                    termination.execution_duration_ms
                );
                Ok(ExecutionResult::snapshot(scope, termination))
            }
            Err(e) => {
                error!(
                    "{} failed on turn {}: {}",
                    scope.id(),
                    scope.execution_turns(),
                    e
                );
                Err(e)
            }
        }
    }

    async fn run_turns(&self, scope: &mut ExecutionScope) -> Result<TerminationRecord> {
        loop {
            scope.execution_turns += 1;
            debug!(
                "{} turn {}/{}",
                scope.id(),
                scope.execution_turns,
                scope.constraints().max_turns
            );

            let messages = self.build_messages(scope);
            let specs = self.advertised_tools(scope.config());
            let response = self
                .client
                .chat(&messages, &specs, &scope.config().model_settings)
                .await?;

            let requested_tools = response.has_tool_calls();
            if requested_tools {
                scope.transcript.add_message(Message::assistant_with_tool_calls(
                    response.content,
                    response.tool_calls.clone(),
                ));

                let outcomes =
                    tools::dispatch(self.tools.as_ref(), scope, &response.tool_calls).await?;
                for outcome in outcomes {
                    let content = render_result(&outcome.result);
                    scope
                        .transcript
                        .add_message(Message::tool_result(content, outcome.call_id));
                }
            } else {
                scope.transcript.add_message(Message::assistant(response.content));
            }

            self.refresh_resources(scope);

            if !requested_tools {
                return Ok(TerminationRecord::completed(scope));
            }

            if let Some(record) = termination::evaluate(scope, TurnLimit::Exhausted) {
                return Ok(record);
            }
        }
    }

    /// Messages for the next turn: output instructions, rendered prompt, transcript
    fn build_messages(&self, scope: &ExecutionScope) -> Vec<Message> {
        let mut messages = Vec::with_capacity(scope.transcript().len() + 2);

        if let Some(instructions) = output_instructions(scope.config()) {
            messages.push(Message::system(instructions));
        }

        let variables = &scope.context().variables;
        let missing = template::unresolved(&scope.config().prompt, variables);
        if !missing.is_empty() {
            debug!("{} prompt has unresolved placeholders: {:?}", scope.id(), missing);
        }
        messages.push(Message::user(template::render(&scope.config().prompt, variables)));

        messages.extend(scope.transcript().messages().iter().cloned());
        messages
    }

    /// Permitted tools the registry can resolve, plus `emit_variable` when
    /// outputs are declared
    fn advertised_tools(&self, config: &ScopeConfiguration) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = config
            .tool_permissions
            .iter()
            .filter_map(|name| {
                self.tools.get_tool(name).map(|tool| ToolSpec {
                    name: name.clone(),
                    description: tool.description().to_string(),
                })
            })
            .collect();

        if !config.output_definitions.is_empty() {
            specs.push(ToolSpec {
                name: tools::EMIT_VARIABLE_TOOL.to_string(),
                description: "Publish an output: {\"name\": string, \"value\": any}".to_string(),
            });
        }
        specs
    }

    fn refresh_resources(&self, scope: &mut ExecutionScope) {
        if let Some(usage) = self.sampler.sample(&scope.id()) {
            scope.record_resources(usage);
        }
    }

    /// Publish a named output of `scope`
    pub fn emit_variable(
        &self,
        scope: &mut ExecutionScope,
        name: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        scope.emit_variable(name, value)
    }

    /// Evaluate whether `scope` must stop.
    ///
    /// The turn check here is `turns > max_turns`. The turn loop stops one
    /// turn earlier, once `turns == max_turns`, so after a run ends as
    /// `MAX_TURNS` this returns `None` for the same scope.
    pub fn check_termination(&self, scope: &ExecutionScope) -> Option<TerminationRecord> {
        termination::check_termination(scope)
    }

    /// Unregister `scope` and mark it `COMPLETED`. Safe to call repeatedly.
    pub fn cleanup(&self, scope: &mut ExecutionScope) {
        self.release(&scope.id());
        scope.status = ScopeStatus::Completed;
    }

    /// Unregister a scope by id, returning whether it was live.
    ///
    /// Unknown ids are a no-op.
    pub fn release(&self, id: &ScopeId) -> bool {
        let removed = self.registry.remove(id);
        self.sampler.release(id);
        if let Some(entry) = &removed {
            debug!(
                "Cleaned up {} after {}s ({} live)",
                id,
                entry.age().num_seconds(),
                self.registry.len()
            );
        }
        removed.is_some()
    }

    /// Initialize, execute and clean up a scope in one call.
    ///
    /// The scope is released on every exit path, including errors.
    pub async fn run(
        &self,
        config: ScopeConfig,
        initial_context: Variables,
    ) -> Result<ExecutionResult> {
        let mut scope = self.initialize_scope(config, initial_context)?;
        let result = self.execute(&mut scope).await;
        self.cleanup(&mut scope);
        if let Err(e) = &result {
            warn!("{} released after failure: {}", scope.id(), e);
        }
        result
    }
}

/// System message listing the declared outputs, `None` when there are none
fn output_instructions(config: &ScopeConfiguration) -> Option<String> {
    if config.output_definitions.is_empty() {
        return None;
    }

    let mut text = format!(
        "Produce the following outputs by calling {}:",
        tools::EMIT_VARIABLE_TOOL
    );
    for (name, definition) in &config.output_definitions {
        text.push_str(&format!("\n- {} ({})", name, definition.kind));
        if let Some(description) = &definition.description {
            text.push_str(&format!(": {}", description));
        }
    }
    Some(text)
}

fn render_result(result: &Value) -> String {
    match result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
