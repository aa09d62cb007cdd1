use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use swarmgate_core::{Message, SwarmgateResult, ToolCall};

/// Token accounting reported by the completion collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// One completion from the model: produced text plus any requested tool
/// invocations.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// The opaque LLM collaborator: takes a system prompt and a conversation,
/// returns text plus optional tool invocations. Implementations own all
/// provider-specific concerns (transport, retries, wire format).
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        conversation: &[Message],
    ) -> SwarmgateResult<Completion>;
}
