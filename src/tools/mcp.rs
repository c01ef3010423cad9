//! Tools served by an external MCP server.
//!
//! The session runs on `rmcp`; each remote tool is surfaced as a [`ToolSpec`]
//! so the agent loop treats it like any locally registered tool.

use std::borrow::Cow;
use std::process::Stdio;
use std::sync::Arc;

use rmcp::model::{CallToolRequestParams, RawContent};
use rmcp::service::{Peer, RunningService, ServiceError};
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::{McpError, ToolError};
use crate::tools::{ApprovalMode, ToolOutput, ToolSpec};

type McpService = RunningService<RoleClient, ()>;

#[derive(Clone, Debug, PartialEq)]
pub struct McpToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

fn map_service_error(err: ServiceError) -> McpError {
    match err {
        ServiceError::McpError(data) => McpError::Rpc {
            code: i64::from(data.code.0),
            message: data.message.to_string(),
        },
        other => McpError::Protocol(other.to_string()),
    }
}

pub struct McpClient {
    server_name: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<McpService>>,
    tools: Vec<McpToolInfo>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_name", &self.server_name)
            .field("tools", &self.tools)
            .finish()
    }
}

impl McpClient {
    /// Spawns `command` and completes the MCP handshake over its stdio.
    pub async fn spawn(
        server_name: impl Into<String>,
        command: &str,
        args: &[String],
    ) -> Result<Arc<Self>, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let spawn_error = |message: String| McpError::Spawn {
            command: command.to_string(),
            message,
        };

        let transport = TokioChildProcess::new(cmd).map_err(|err| spawn_error(err.to_string()))?;
        tracing::info!(command, "mcp server process started");

        let service = ()
            .serve(transport)
            .await
            .map_err(|err| McpError::Protocol(format!("handshake failed: {err}")))?;

        Self::from_service(server_name, service).await
    }

    /// Wraps an initialized session and caches the server's tool listing.
    pub async fn from_service(
        server_name: impl Into<String>,
        service: McpService,
    ) -> Result<Arc<Self>, McpError> {
        let server_name = server_name.into();
        let peer = service.peer().clone();

        let tools = peer
            .list_all_tools()
            .await
            .map_err(map_service_error)?
            .into_iter()
            .map(|tool| McpToolInfo {
                name: tool.name.to_string(),
                description: tool.description.as_deref().map(str::to_string),
                input_schema: Value::Object((*tool.input_schema).clone()),
            })
            .collect::<Vec<_>>();

        tracing::info!(
            server = %server_name,
            tools = tools.len(),
            "mcp server initialized"
        );

        Ok(Arc::new(Self {
            server_name,
            peer,
            service: Mutex::new(Some(service)),
            tools,
        }))
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn tools(&self) -> &[McpToolInfo] {
        &self.tools
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        tracing::debug!(server = %self.server_name, tool = name, "calling mcp tool");

        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(ToolError::InvalidArguments {
                    tool: name.to_string(),
                    message: format!("expected a JSON object, got {other}"),
                });
            }
        };

        let mut request = CallToolRequestParams::new(Cow::Owned(name.to_string()));
        request.arguments = arguments;

        let result = self
            .peer
            .call_tool(request)
            .await
            .map_err(|err| ToolError::Execution(map_service_error(err).to_string()))?;

        let text = result
            .content
            .iter()
            .filter_map(|content| match &content.raw {
                RawContent::Text(part) => Some(part.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if result.is_error.unwrap_or(false) {
            Err(ToolError::Execution(text))
        } else {
            Ok(text)
        }
    }

    /// Exposes every remote tool as a [`ToolSpec`] bound to this client.
    pub fn tool_specs(self: &Arc<Self>, approval_mode: ApprovalMode) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|info| {
                let client = Arc::clone(self);
                let tool_name = info.name.clone();
                let spec = ToolSpec::new(
                    info.name.clone(),
                    info.description.clone().unwrap_or_default(),
                );
                let spec = match spec.clone().with_schema(info.input_schema.clone()) {
                    Ok(with_schema) => with_schema,
                    Err(err) => {
                        tracing::warn!(tool = %info.name, error = %err, "mcp tool schema rejected, accepting any arguments");
                        spec
                    }
                };

                spec.with_approval_mode(approval_mode)
                    .with_handler(move |args| {
                        let client = Arc::clone(&client);
                        let tool_name = tool_name.clone();
                        async move {
                            client
                                .call_tool(&tool_name, args)
                                .await
                                .map(ToolOutput::Text)
                        }
                    })
            })
            .collect()
    }

    /// Shuts the session down; later calls fail with a closed-transport error.
    pub async fn close(&self) -> Result<(), McpError> {
        tracing::info!(server = %self.server_name, "closing mcp client");
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|err| McpError::Protocol(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::task::JoinHandle;

    use super::*;

    /// Minimal line-delimited MCP server. A server-initiated notification
    /// precedes every response, `slow` answers late and `close_after_listing`
    /// hangs up once tools have been listed.
    fn serve_fake(stream: DuplexStream, close_after_listing: bool) -> JoinHandle<()> {
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(stream);
            let mut lines = BufReader::new(read).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(message) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let Some(id) = message.get("id").cloned() else {
                    continue;
                };

                let method = message["method"].as_str().unwrap_or_default();
                let tool = message["params"]["name"].as_str().unwrap_or_default();
                let reply = match (method, tool) {
                    ("initialize", _) => json!({"result": {
                        "protocolVersion": message["params"]["protocolVersion"].clone(),
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "fake", "version": "0.1.0"}
                    }}),
                    ("tools/list", _) => json!({"result": {"tools": [{
                        "name": "search",
                        "description": "Search the web",
                        "inputSchema": {
                            "type": "object",
                            "properties": {"query": {"type": "string"}},
                            "required": ["query"]
                        }
                    }]}}),
                    ("tools/call", "search") => json!({"result": {"content": [
                        {"type": "text", "text": "Paris"},
                        {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                        {"type": "text", "text": "is the capital"}
                    ]}}),
                    ("tools/call", "limited") => json!({"result": {
                        "content": [{"type": "text", "text": "rate limited"}],
                        "isError": true
                    }}),
                    ("tools/call", "slow") => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        json!({"result": {"content": [{"type": "text", "text": "late"}]}})
                    }
                    _ => json!({"error": {"code": -32601, "message": "method not found"}}),
                };

                let notice = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "data": format!("handling {method}")}
                });
                let mut response = reply;
                response["jsonrpc"] = json!("2.0");
                response["id"] = id;

                let payload = format!("{notice}\n{response}\n");
                if write.write_all(payload.as_bytes()).await.is_err() {
                    break;
                }

                if close_after_listing && method == "tools/list" {
                    break;
                }
            }
        })
    }

    async fn connect_fake(close_after_listing: bool) -> Arc<McpClient> {
        let (client_stream, server_stream) = tokio::io::duplex(64 * 1024);
        serve_fake(server_stream, close_after_listing);
        let service = ().serve(client_stream).await.expect("handshake");
        McpClient::from_service("fake", service)
            .await
            .expect("tools listed")
    }

    #[tokio::test]
    async fn handshake_lists_remote_tools() {
        let client = connect_fake(false).await;

        assert_eq!(client.server_name(), "fake");
        assert_eq!(client.tools().len(), 1);
        assert_eq!(client.tools()[0].name, "search");
        assert_eq!(
            client.tools()[0].input_schema["required"],
            json!(["query"])
        );
    }

    #[tokio::test]
    async fn tool_specs_call_remote_tool_and_join_text_parts() {
        let client = connect_fake(false).await;
        let specs = client.tool_specs(ApprovalMode::AlwaysRequire);
        assert_eq!(specs[0].name(), "search");
        assert_eq!(specs[0].approval_mode(), ApprovalMode::AlwaysRequire);

        let output = specs[0]
            .execute(json!({"query": "capital of France"}))
            .await
            .expect("tool runs");
        assert_eq!(output.into_text(), "Paris\nis the capital");
    }

    #[tokio::test]
    async fn remote_error_result_becomes_tool_error() {
        let client = connect_fake(false).await;
        let err = client
            .call_tool("limited", json!({}))
            .await
            .expect_err("must fail");

        assert_eq!(err.to_string(), "tool execution failed: rate limited");
    }

    #[tokio::test]
    async fn rpc_error_is_reported_with_code() {
        let client = connect_fake(false).await;
        let err = client
            .call_tool("unknown", json!({}))
            .await
            .expect_err("must fail");

        assert!(err.to_string().contains("-32601"), "{err}");
    }

    #[tokio::test]
    async fn abandoned_call_does_not_poison_later_calls() {
        let client = connect_fake(false).await;

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), client.call_tool("slow", json!({})))
                .await;
        assert!(abandoned.is_err());

        let text = client
            .call_tool("search", json!({"query": "x"}))
            .await
            .expect("later call succeeds");
        assert_eq!(text, "Paris\nis the capital");
    }

    #[tokio::test]
    async fn call_after_server_hangs_up_fails() {
        let client = connect_fake(true).await;

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), client.call_tool("search", json!({})))
                .await
                .expect("call settles");
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn non_object_arguments_are_rejected_locally() {
        let client = connect_fake(false).await;
        let err = client
            .call_tool("search", json!("plain"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn close_shuts_session_down() {
        let client = connect_fake(false).await;
        client.close().await.expect("closes");
        client.close().await.expect("second close is a no-op");
        assert!(client.call_tool("search", json!({})).await.is_err());
    }
}
