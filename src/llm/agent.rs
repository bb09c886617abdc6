use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{ChatEngine, ChatMessage, ToolCall};
use crate::error::AppError;
use crate::system_prompt::build_datetime_system_message;
use crate::tools::{ExecutionContext, ToolSet};

const EMPTY_REPLY: &str = "I couldn't come up with an answer. Please try rephrasing your request.";

#[derive(Debug, thiserror::Error)]
pub enum AgentExecutionError {
    #[error("tool call failed: {0}")]
    Tool(#[from] AppError),
    #[error("LLM request failed: {0:#}")]
    Engine(anyhow::Error),
    #[error("malformed arguments for tool '{name}': {reason}")]
    MalformedToolCall { name: String, reason: String },
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("no answer after {0} steps")]
    IterationLimit(usize),
}

impl AgentExecutionError {
    /// Text that is safe to show in the chat.
    pub fn user_message(&self) -> String {
        match self {
            AgentExecutionError::Tool(e) => e.user_message(),
            AgentExecutionError::IterationLimit(steps) => format!(
                "I've reached my reasoning limit for this task ({} steps). Try breaking your request into smaller steps.",
                steps
            ),
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}

/// Drives the model through tool calls until it answers the user.
pub struct SpotifyAgent {
    engine: Arc<dyn ChatEngine>,
    tools: Arc<ToolSet>,
    system_prompt: String,
    max_iterations: usize,
}

impl SpotifyAgent {
    pub fn new(
        engine: Arc<dyn ChatEngine>,
        tools: Arc<ToolSet>,
        system_prompt: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            engine,
            tools,
            system_prompt: system_prompt.into(),
            max_iterations,
        }
    }

    pub async fn run(
        &self,
        input: &str,
        history: &[ChatMessage],
        ctx: &ExecutionContext,
    ) -> Result<String, AgentExecutionError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::System(format!(
            "{}\n\n{}",
            self.system_prompt,
            build_datetime_system_message()
        )));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::User(input.to_string()));

        let definitions = self.tools.definitions();

        for i in 0..self.max_iterations {
            info!("Agent: iteration {}/{} for user {}", i + 1, self.max_iterations, ctx.user_id);
            let reply = self
                .engine
                .complete(&messages, &definitions)
                .await
                .map_err(|e| {
                    error!("Agent: LLM request failed for user {}: {:#}", ctx.user_id, e);
                    AgentExecutionError::Engine(e)
                })?;

            if reply.tool_calls.is_empty() {
                info!("Agent: answered user {} after {} iteration(s)", ctx.user_id, i + 1);
                return Ok(reply
                    .content
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| EMPTY_REPLY.to_string()));
            }

            info!("Agent: LLM requested {} tool call(s)", reply.tool_calls.len());
            messages.push(ChatMessage::Assistant {
                content: reply.content.clone(),
                tool_calls: reply.tool_calls.clone(),
            });

            for call in &reply.tool_calls {
                let output = self.execute_tool_call(call, ctx).await?;
                messages.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: output,
                });
            }
        }

        warn!(
            "Agent: exceeded max iterations ({}) for user {}",
            self.max_iterations, ctx.user_id
        );
        Err(AgentExecutionError::IterationLimit(self.max_iterations))
    }

    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        ctx: &ExecutionContext,
    ) -> Result<String, AgentExecutionError> {
        let tool = self.tools.get(&call.name).ok_or_else(|| {
            error!("Agent: tool not found: {}", call.name);
            AgentExecutionError::UnknownTool(call.name.clone())
        })?;

        // Some models send an empty string for argument-less calls.
        let arguments: Value = if call.arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                AgentExecutionError::MalformedToolCall {
                    name: call.name.clone(),
                    reason: e.to_string(),
                }
            })?
        };

        debug!("Agent: calling {} with {}", call.name, arguments);
        Ok(tool.invoke(&arguments, ctx).await?)
    }
}
