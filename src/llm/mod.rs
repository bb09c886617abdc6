pub mod agent;
pub mod client;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{MessageRole, StoredMessage};

pub use agent::{AgentExecutionError, SpotifyAgent};
pub use client::LlmClient;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON text exactly as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

impl From<&StoredMessage> for ChatMessage {
    fn from(message: &StoredMessage) -> Self {
        match message.role {
            MessageRole::User => ChatMessage::User(message.text.clone()),
            MessageRole::Assistant => ChatMessage::assistant(message.text.clone()),
        }
    }
}

/// One model turn: either tool calls to run, or the final answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// The language model behind the agent.
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// `tools` are function definitions as produced by [`crate::tools::Tool::definition`].
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<EngineReply>;
}
