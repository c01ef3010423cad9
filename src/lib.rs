//! Tool-calling agent turn loop for Rust.
//!
//! Surface:
//! - `Agent` loop that alternates model requests and concurrent tool execution
//! - `run` and `run_stream` entry points, with `resume` for human approval
//! - Typed tools, JSON schema validation and structured final answers
//! - Azure OpenAI and Anthropic adapters, plus MCP stdio tools via `McpClient`

pub mod agent;
pub mod error;
pub mod llm;
pub mod message;
pub mod schema;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, ApprovalDecision, PendingApproval, RunEvent, RunOutcome,
    run, run_stream,
};
pub use error::{AgentError, ConfigError, McpError, ProviderError, SchemaError, ToolError};
pub use llm::{
    AnthropicModel, AnthropicModelConfig, AzureOpenAIConfig, AzureOpenAIModel, ChatModel,
    ModelCompletion, ModelRequest, ModelStream, ModelStreamChunk, ModelToolChoice,
    ModelToolDefinition, ModelUsage, ResponseFormat,
};
pub use message::{ContentItem, Conversation, Message, Role, ToolCall};
pub use tools::mcp::{McpClient, McpToolInfo};
pub use tools::{ApprovalMode, ToolOutput, ToolSpec};
