use anthropic_ai_sdk::client::AnthropicClient;
use anthropic_ai_sdk::types::message::{
    ContentBlock, CreateMessageParams, CreateMessageResponse, Message as AnthropicMessage,
    MessageClient, MessageError, RequiredMessageParams, Role as AnthropicRole, Tool, ToolChoice,
};
use async_trait::async_trait;

use crate::error::{AgentError, ConfigError, ProviderError};
use crate::llm::{
    ChatModel, ModelCompletion, ModelRequest, ModelToolChoice, ModelUsage, ResponseFormat,
};
use crate::message::{ContentItem, Message, Role};

const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone)]
/// Runtime configuration for [`AnthropicModel`].
pub struct AnthropicModelConfig {
    /// Anthropic API key.
    pub api_key: String,
    /// Model id (for example `claude-sonnet-4-5`).
    pub model: String,
    /// Anthropic API version header value.
    pub api_version: String,
    /// Optional base URL override for proxies or compatible endpoints.
    pub api_base_url: Option<String>,
    /// Maximum output tokens per call.
    pub max_tokens: u32,
    /// Optional sampling temperature.
    pub temperature: Option<f32>,
}

impl AnthropicModelConfig {
    /// Creates a config with sensible defaults.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_version: AnthropicClient::DEFAULT_API_VERSION.to_string(),
            api_base_url: None,
            max_tokens: 4096,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone)]
/// Anthropic provider adapter implementing [`ChatModel`].
///
/// The Messages API has no native response-format parameter, so structured
/// output is requested through the system prompt.
pub struct AnthropicModel {
    client: AnthropicClient,
    config: AnthropicModelConfig,
}

impl AnthropicModel {
    /// Creates a model adapter from explicit config.
    pub fn new(config: AnthropicModelConfig) -> Result<Self, ProviderError> {
        let mut builder =
            AnthropicClient::builder(config.api_key.clone(), config.api_version.clone());
        if let Some(url) = &config.api_base_url {
            builder = builder.with_api_base_url(url.clone());
        }

        let client = builder
            .build::<MessageError>()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Creates a model adapter using `ANTHROPIC_API_KEY` from the environment.
    pub fn from_env(model: impl Into<String>) -> Result<Self, AgentError> {
        let api_key = std::env::var(ENV_API_KEY)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingSetting(ENV_API_KEY.to_string()))?;
        Ok(Self::new(AnthropicModelConfig::new(api_key, model))?)
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    async fn invoke(&self, request: &ModelRequest<'_>) -> Result<ModelCompletion, ProviderError> {
        let (history, system) = to_anthropic_messages(request.messages, request.response_format);

        let required = RequiredMessageParams {
            model: self.config.model.clone(),
            messages: history,
            max_tokens: self.config.max_tokens,
        };

        let mut params = CreateMessageParams::new(required).with_stream(false);

        if let Some(system_prompt) = system {
            params = params.with_system(system_prompt);
        }

        if let Some(temperature) = self.config.temperature {
            params = params.with_temperature(temperature);
        }

        if !request.tools.is_empty() {
            let anthropic_tools = request
                .tools
                .iter()
                .map(|tool| Tool {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    input_schema: tool.parameters.clone(),
                })
                .collect::<Vec<_>>();

            params = params.with_tools(anthropic_tools);
            params = params.with_tool_choice(match &request.tool_choice {
                ModelToolChoice::Auto => ToolChoice::Auto,
                ModelToolChoice::Required => ToolChoice::Any,
                ModelToolChoice::None => ToolChoice::None,
                ModelToolChoice::Tool(name) => ToolChoice::Tool { name: name.clone() },
            });
        }

        tracing::debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            "sending anthropic message request"
        );

        let response = self
            .client
            .create_message(Some(&params))
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(normalize_response(&response))
    }
}

fn structured_output_instruction(format: &ResponseFormat) -> String {
    format!(
        "Respond only with a JSON object named {} that matches this JSON schema, without prose or code fences:\n{}",
        format.name, format.schema
    )
}

fn to_anthropic_messages(
    messages: &[Message],
    response_format: Option<&ResponseFormat>,
) -> (Vec<AnthropicMessage>, Option<String>) {
    let mut system_lines = Vec::new();
    let mut anthropic_messages = Vec::new();
    // consecutive tool results must share a single user turn
    let mut pending_results: Vec<ContentBlock> = Vec::new();

    for message in messages {
        let mut text = String::new();
        let mut blocks = Vec::new();

        for item in message.content() {
            match item {
                ContentItem::Text { value } => text.push_str(value),
                ContentItem::ToolCallRequest {
                    id,
                    name,
                    arguments,
                } => blocks.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: arguments.clone(),
                }),
                ContentItem::ToolCallResult {
                    id,
                    value,
                    is_error,
                } => blocks.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: if *is_error {
                        format!("Error: {value}")
                    } else {
                        value.clone()
                    },
                }),
                ContentItem::ApprovalRequest { .. } | ContentItem::ApprovalResponse { .. } => {}
            }
        }

        match message.role() {
            Role::Tool => {
                pending_results.extend(blocks);
                continue;
            }
            Role::System => {
                if !text.is_empty() {
                    system_lines.push(text);
                }
                continue;
            }
            Role::User | Role::Assistant => {}
        }

        if text.is_empty() && blocks.is_empty() {
            continue;
        }

        if !pending_results.is_empty() {
            anthropic_messages.push(AnthropicMessage::new_blocks(
                AnthropicRole::User,
                std::mem::take(&mut pending_results),
            ));
        }

        match message.role() {
            Role::User => {
                anthropic_messages.push(AnthropicMessage::new_text(AnthropicRole::User, text));
            }
            Role::Assistant | Role::System | Role::Tool => {
                let mut content = Vec::new();
                if !text.is_empty() {
                    content.push(ContentBlock::Text { text });
                }
                content.extend(blocks);
                anthropic_messages.push(AnthropicMessage::new_blocks(
                    AnthropicRole::Assistant,
                    content,
                ));
            }
        }
    }

    if !pending_results.is_empty() {
        anthropic_messages.push(AnthropicMessage::new_blocks(
            AnthropicRole::User,
            pending_results,
        ));
    }

    if let Some(format) = response_format {
        system_lines.push(structured_output_instruction(format));
    }

    let system = if system_lines.is_empty() {
        None
    } else {
        Some(system_lines.join("\n\n"))
    };

    (anthropic_messages, system)
}

fn normalize_response(response: &CreateMessageResponse) -> ModelCompletion {
    let mut content = Vec::new();

    for block in &response.content {
        match block {
            ContentBlock::Text { text } => content.push(ContentItem::text(text.clone())),
            ContentBlock::ToolUse { id, name, input } => {
                content.push(ContentItem::ToolCallRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                })
            }
            _ => {}
        }
    }

    ModelCompletion {
        content,
        usage: Some(ModelUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        }),
    }
}
