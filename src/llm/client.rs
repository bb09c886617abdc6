use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ChatEngine, ChatMessage, EngineReply, ToolCall};
use crate::config::Config;

/// [`ChatEngine`] for any OpenAI-compatible chat completions endpoint.
pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    chat_model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let chat_config = OpenAIConfig::new()
            .with_api_base(&config.llm_url)
            .with_api_key(config.llm_api_key.as_deref().unwrap_or("unused"));

        Self {
            chat_client: Client::with_config(chat_config),
            chat_model: config.llm_model.clone(),
            temperature: config.llm_temperature,
        }
    }
}

#[async_trait]
impl ChatEngine for LlmClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<EngineReply> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(&self.chat_model)
            .messages(messages)
            .temperature(self.temperature);
        if !tools.is_empty() {
            request.tools(tools.iter().map(to_tool).collect::<anyhow::Result<Vec<_>>>()?);
        }
        let request = request.build()?;

        let response = self.chat_client.chat().create(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))?;
        debug!("LLM: finish reason {:?}", choice.finish_reason);

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(EngineReply {
            content: choice.message.content,
            tool_calls,
        })
    }
}

fn to_request_message(message: &ChatMessage) -> anyhow::Result<ChatCompletionRequestMessage> {
    let message = match message {
        ChatMessage::System(text) => ChatCompletionRequestSystemMessageArgs::default()
            .content(text.clone())
            .build()?
            .into(),
        ChatMessage::User(text) => ChatCompletionRequestUserMessageArgs::default()
            .content(text.clone())
            .build()?
            .into(),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
            if let Some(content) = content {
                builder.content(content.clone());
            }
            if !tool_calls.is_empty() {
                builder.tool_calls(
                    tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            builder.build()?.into()
        }
        ChatMessage::Tool { call_id, content } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(call_id.clone())
            .content(content.clone())
            .build()?
            .into(),
    };
    Ok(message)
}

fn to_tool(definition: &Value) -> anyhow::Result<ChatCompletionTool> {
    let function = &definition["function"];
    let name = function["name"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("tool definition without a name: {}", definition))?;

    Ok(ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name(name)
                .description(function["description"].as_str().unwrap_or_default())
                .parameters(function["parameters"].clone())
                .build()?,
        )
        .build()?)
}
