//! Per-scope conversation transcript
//!
//! Holds what happened after the rendered prompt during one execution: the
//! model's replies, the tool calls it made and the tool results that came
//! back. The system message and the prompt are rebuilt every turn and are
//! not stored here.
//!
//! Messages are grouped into exchanges. An exchange starts with an assistant
//! message and includes the tool results answering it. When the estimated
//! size passes the context limit, whole exchanges are dropped from the front
//! so a tool result never outlives the call it answers. The latest exchange
//! is always kept.

use crate::llm::{Message, MessageRole};

/// Default context limit in tokens
pub const DEFAULT_CONTEXT_LIMIT: usize = 8000;

/// Rough estimate: 1 token ≈ 4 characters
const CHARS_PER_TOKEN: usize = 4;

/// Role and framing overhead per message
const MESSAGE_OVERHEAD_TOKENS: usize = 10;

#[derive(Debug, Clone)]
pub struct WorkingMemory {
    messages: Vec<Message>,
    context_limit: usize,
    token_count: usize,
    trimmed: usize,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_CONTEXT_LIMIT)
    }

    pub fn with_limit(context_limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            context_limit,
            token_count: 0,
            trimmed: 0,
        }
    }

    /// Append a message, trimming old exchanges when over the limit
    pub fn add_message(&mut self, message: Message) {
        self.token_count += Self::estimate_tokens(&message);
        self.messages.push(message);

        if self.token_count > self.context_limit {
            self.trim();
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn context_limit(&self) -> usize {
        self.context_limit
    }

    /// Messages dropped by trimming since the last clear
    pub fn trimmed(&self) -> usize {
        self.trimmed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.token_count = 0;
        self.trimmed = 0;
    }

    /// Length of the first exchange, if another exchange follows it
    fn leading_exchange_len(&self) -> Option<usize> {
        self.messages
            .iter()
            .skip(1)
            .position(|m| m.role != MessageRole::Tool)
            .map(|i| i + 1)
    }

    fn trim(&mut self) {
        while self.token_count > self.context_limit {
            let Some(len) = self.leading_exchange_len() else {
                break;
            };
            for removed in self.messages.drain(..len) {
                self.token_count = self
                    .token_count
                    .saturating_sub(Self::estimate_tokens(&removed));
                self.trimmed += 1;
            }
        }
    }

    fn estimate_tokens(message: &Message) -> usize {
        let id_chars = message.tool_call_id.as_ref().map_or(0, String::len);
        let call_chars: usize = message
            .tool_calls
            .iter()
            .map(|call| call.id.len() + call.name.len() + call.arguments.to_string().len())
            .sum();

        let chars = message.content.len() + id_chars + call_chars;
        chars.div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}
