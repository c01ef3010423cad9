mod anthropic;
mod azure;
mod sse;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use schemars::JsonSchema;
use serde_json::Value;

use crate::error::ProviderError;
use crate::message::{ContentItem, Message, ToolCall};

pub use anthropic::{AnthropicModel, AnthropicModelConfig};
pub use azure::{AzureOpenAIConfig, AzureOpenAIModel};

#[derive(Clone, Debug, PartialEq)]
pub struct ModelToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelToolChoice {
    Auto,
    Required,
    None,
    Tool(String),
}

/// JSON schema the final answer must conform to.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    pub fn for_type<T: JsonSchema>() -> Self {
        let mut schema = schemars::schema_for!(T).to_value();
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
        }
        Self::new(T::schema_name(), schema)
    }
}

pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ModelToolDefinition],
    pub tool_choice: ModelToolChoice,
    pub response_format: Option<&'a ResponseFormat>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCompletion {
    pub content: Vec<ContentItem>,
    pub usage: Option<ModelUsage>,
}

impl ModelCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            usage: None,
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            content: calls.into_iter().map(ContentItem::from).collect(),
            usage: None,
        }
    }

    /// Replays the completion as the chunk sequence a streaming provider
    /// would have produced.
    pub fn into_chunks(self) -> Vec<ModelStreamChunk> {
        let mut chunks = Vec::new();
        for item in self.content {
            match item {
                ContentItem::Text { value } => chunks.push(ModelStreamChunk::TextDelta(value)),
                ContentItem::ToolCallRequest {
                    id,
                    name,
                    arguments,
                } => chunks.push(ModelStreamChunk::ToolCall(ToolCall {
                    id,
                    name,
                    arguments,
                })),
                // models never originate these
                ContentItem::ToolCallResult { .. }
                | ContentItem::ApprovalRequest { .. }
                | ContentItem::ApprovalResponse { .. } => {}
            }
        }
        if let Some(usage) = self.usage {
            chunks.push(ModelStreamChunk::Usage(usage));
        }
        chunks
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ModelUsage {
    pub fn absorb(&mut self, other: ModelUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelStreamChunk {
    TextDelta(String),
    /// A fully assembled tool call; providers buffer argument fragments.
    ToolCall(ToolCall),
    Usage(ModelUsage),
}

pub type ModelStream<'a> = BoxStream<'a, Result<ModelStreamChunk, ProviderError>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, request: &ModelRequest<'_>) -> Result<ModelCompletion, ProviderError>;

    /// Streams the response. The default waits for [`ChatModel::invoke`] and
    /// replays it, so non-streaming providers still work with the loop.
    fn invoke_stream<'a>(&'a self, request: &'a ModelRequest<'a>) -> ModelStream<'a> {
        Box::pin(try_stream! {
            let completion = self.invoke(request).await?;
            for chunk in completion.into_chunks() {
                yield chunk;
            }
        })
    }
}
