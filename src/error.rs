use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool execution failed: {0}")]
    Execution(String),
    #[error("tool {tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingSetting(String),
    #[error("agent model must be configured via AgentBuilder::model(...)")]
    MissingModel,
    #[error("duplicate tool registered: {0}")]
    DuplicateTool(String),
    #[error("max_rounds must be at least 1")]
    ZeroRounds,
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn mcp server {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("mcp protocol error: {0}")]
    Protocol(String),
    #[error("mcp server returned error {code}: {message}")]
    Rpc { code: i64, message: String },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("round limit reached ({max_rounds})")]
    RoundLimitExceeded { max_rounds: u32, partial_text: String },
    #[error("approval decisions missing for tool calls: {}", missing.join(", "))]
    IncompleteApprovalSet { missing: Vec<String> },
    #[error("no pending approval for tool call: {0}")]
    UnknownApproval(String),
    #[error("agent is awaiting approval decisions, call resume first")]
    AwaitingApproval,
    #[error("agent has no pending approvals to resume")]
    NotAwaitingApproval,
    #[error("structured output does not match schema: {0}")]
    SchemaMismatch(String),
    #[error("agent stream ended without final response")]
    MissingFinalResponse,
}
