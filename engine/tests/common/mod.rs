//! Shared fakes for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sdk::tool::Tool;
use sdk::types::{ToolArgs, ToolError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subagent_engine::llm::{self, ChatResponse, LLMClient, LLMError, Message, ToolCall, ToolSpec};
use subagent_engine::{EngineConfig, ScopeEngine, ToolSet};

/// LLM client replaying a script, then repeating a fallback reply
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ChatResponse>>,
    fallback: ChatResponse,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    /// Play `replies` in order, then answer with plain text
    pub fn new(replies: Vec<ChatResponse>) -> Arc<Self> {
        Self::with_fallback(replies, ChatResponse::text("done"))
    }

    /// Request `tool` on every turn, forever
    pub fn looping(tool: &str) -> Arc<Self> {
        Self::with_fallback(Vec::new(), tool_request(tool, json!({})))
    }

    pub fn with_fallback(replies: Vec<ChatResponse>, fallback: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages sent on each call so far
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
        _model_settings: &Value,
    ) -> llm::Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        tokio::task::yield_now().await;

        let scripted = self.replies.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            let mut reply = self.fallback.clone();
            for call in &mut reply.tool_calls {
                call.id = format!("{}_{}", call.id, n);
            }
            reply
        }))
    }
}

/// LLM client whose backend is always down
pub struct UnavailableClient;

#[async_trait]
impl LLMClient for UnavailableClient {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _model_settings: &Value,
    ) -> llm::Result<ChatResponse> {
        Err(LLMError::ProviderUnavailable("backend offline".into()))
    }
}

/// A reply requesting a single tool call
pub fn tool_request(tool: &str, arguments: Value) -> ChatResponse {
    ChatResponse::text("").with_tool_call(ToolCall::new(format!("call_{tool}"), tool, arguments))
}

/// Tool returning its arguments, counting invocations
pub struct EchoTool {
    name: String,
    calls: AtomicUsize,
}

impl EchoTool {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    async fn execute(&self, args: ToolArgs) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(args.into_value())
    }
}

/// Tool that always fails with the given message
pub struct FailingTool {
    pub message: &'static str,
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "Flaky"
    }

    async fn execute(&self, _args: ToolArgs) -> Result<Value, ToolError> {
        Err(ToolError::failed(self.message))
    }
}

/// Tool that takes a while to finish
pub struct SlowTool {
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "Slow"
    }

    async fn execute(&self, _args: ToolArgs) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!("finished"))
    }
}

/// Tool set with `Read` and `Write` echo tools, a failing and a slow tool
pub fn standard_tools() -> ToolSet {
    ToolSet::new()
        .with_tool(EchoTool::new("Read"))
        .with_tool(EchoTool::new("Write"))
        .with_tool(Arc::new(FailingTool {
            message: "permission denied by filesystem",
        }))
        .with_tool(Arc::new(SlowTool {
            delay: Duration::from_millis(20),
        }))
}

pub fn engine_with(client: Arc<dyn LLMClient>) -> ScopeEngine {
    ScopeEngine::new(EngineConfig::default(), client, Arc::new(standard_tools()))
}
