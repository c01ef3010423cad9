use std::collections::BTreeMap;

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AgentError, ConfigError, ProviderError};
use crate::llm::sse::SseDecoder;
use crate::llm::{
    ChatModel, ModelCompletion, ModelRequest, ModelStream, ModelStreamChunk, ModelToolChoice,
    ModelUsage, ResponseFormat,
};
use crate::message::{ContentItem, Message, Role, ToolCall};

const ENV_ENDPOINT: &str = "azure_endpoint";
const ENV_API_KEY: &str = "azure_apikey";
const ENV_DEPLOYMENT: &str = "azure_deployment";
const ENV_API_VERSION: &str = "azure_version";
const EMPTY_USER_CONTENT_FALLBACK: &str = " ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone)]
/// Connection settings for an Azure OpenAI chat deployment.
pub struct AzureOpenAIConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    pub api_key: String,
    /// Deployment name; Azure routes to the model by deployment, not model id.
    pub deployment: String,
    pub api_version: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl AzureOpenAIConfig {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: api_version.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Reads `azure_endpoint`, `azure_apikey`, `azure_deployment` and
    /// `azure_version`. Fails before any request if one is missing or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
        };

        Ok(Self::new(
            require(ENV_ENDPOINT)?,
            require(ENV_API_KEY)?,
            require(ENV_DEPLOYMENT)?,
            require(ENV_API_VERSION)?,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct AzureOpenAIModel {
    client: Client,
    config: AzureOpenAIConfig,
}

impl AzureOpenAIModel {
    pub fn new(config: AzureOpenAIConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, AgentError> {
        Ok(Self::new(AzureOpenAIConfig::from_env()?)?)
    }

    fn url(&self) -> String {
        let base = self.config.endpoint.trim_end_matches('/');
        format!(
            "{base}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.deployment, self.config.api_version
        )
    }

    async fn send(&self, body: &AzureChatRequest) -> Result<reqwest::Response, ProviderError> {
        tracing::debug!(
            deployment = %self.config.deployment,
            messages = body.messages.len(),
            stream = body.stream,
            "sending azure chat completion request"
        );

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(extract_api_error(response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for AzureOpenAIModel {
    async fn invoke(&self, request: &ModelRequest<'_>) -> Result<ModelCompletion, ProviderError> {
        let body = build_request(request, &self.config, false);
        let payload = self
            .send(&body)
            .await?
            .json::<AzureChatCompletionResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        normalize_response(payload)
    }

    fn invoke_stream<'a>(&'a self, request: &'a ModelRequest<'a>) -> ModelStream<'a> {
        Box::pin(try_stream! {
            let body = build_request(request, &self.config, true);
            let response = self.send(&body).await?;
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut assembler = ToolCallAssembler::default();
            let mut finished = false;

            while !finished {
                let Some(chunk) = bytes.next().await else {
                    break;
                };
                let chunk = chunk.map_err(|err| ProviderError::Response(err.to_string()))?;

                for data in decoder.push(&chunk) {
                    if data.trim() == DONE_SENTINEL {
                        finished = true;
                        break;
                    }
                    for output in assembler.absorb(parse_stream_chunk(&data)?) {
                        yield output;
                    }
                }
            }

            if !finished {
                if let Some(data) = decoder.finish() {
                    if data.trim() != DONE_SENTINEL {
                        for output in assembler.absorb(parse_stream_chunk(&data)?) {
                            yield output;
                        }
                    }
                }
            }

            for call in assembler.finish()? {
                yield ModelStreamChunk::ToolCall(call);
            }
        })
    }
}

#[derive(Debug, Serialize)]
struct AzureChatRequest {
    messages: Vec<AzureRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AzureToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AzureToolChoicePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum AzureRequestMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<AzureToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AzureToolDefinition {
    #[serde(rename = "type")]
    type_: &'static str,
    function: AzureFunctionDefinition,
}

#[derive(Debug, Serialize)]
struct AzureFunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AzureToolChoicePayload {
    Mode(&'static str),
    Specific {
        #[serde(rename = "type")]
        type_: &'static str,
        function: AzureToolChoiceFunction,
    },
}

#[derive(Debug, Serialize)]
struct AzureToolChoiceFunction {
    name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AzureToolCall {
    id: String,
    #[serde(rename = "type")]
    type_: String,
    function: AzureToolCallFunction,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct AzureToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct AzureChatCompletionResponse {
    #[serde(default)]
    choices: Vec<AzureChoice>,
    usage: Option<AzureUsage>,
}

#[derive(Debug, Deserialize)]
struct AzureChoice {
    message: Option<AzureAssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AzureAssistantMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<AzureToolCall>,
}

#[derive(Debug, Deserialize)]
struct AzureUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

impl From<AzureUsage> for ModelUsage {
    fn from(usage: AzureUsage) -> Self {
        ModelUsage {
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzureStreamChunk {
    #[serde(default)]
    choices: Vec<AzureStreamChoice>,
    usage: Option<AzureUsage>,
}

#[derive(Debug, Deserialize)]
struct AzureStreamChoice {
    #[serde(default)]
    delta: Option<AzureDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<AzureToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct AzureToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<AzureFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct AzureFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureErrorEnvelope {
    error: AzureApiError,
}

#[derive(Debug, Deserialize)]
struct AzureApiError {
    message: Option<String>,
    code: Option<Value>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Collects streamed tool-call fragments keyed by their `index`; text deltas
/// pass straight through.
#[derive(Debug, Default)]
struct ToolCallAssembler {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAssembler {
    fn absorb(&mut self, chunk: AzureStreamChunk) -> Vec<ModelStreamChunk> {
        let mut outputs = Vec::new();

        for choice in chunk.choices {
            let delta = choice.delta.unwrap_or_default();
            if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
                outputs.push(ModelStreamChunk::TextDelta(text));
            }
            for fragment in delta.tool_calls {
                let partial = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    partial.id = Some(id);
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        partial.name = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
        }

        if let Some(usage) = chunk.usage {
            outputs.push(ModelStreamChunk::Usage(usage.into()));
        }

        outputs
    }

    fn finish(self) -> Result<Vec<ToolCall>, ProviderError> {
        self.calls
            .into_iter()
            .map(|(index, partial)| {
                let (Some(id), Some(name)) = (partial.id, partial.name) else {
                    return Err(ProviderError::Response(format!(
                        "streamed tool call {index} is missing its id or name"
                    )));
                };
                let arguments = parse_arguments(&name, &partial.arguments)?;
                Ok(ToolCall {
                    id,
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

fn parse_stream_chunk(data: &str) -> Result<AzureStreamChunk, ProviderError> {
    serde_json::from_str(data)
        .map_err(|err| ProviderError::Response(format!("invalid stream chunk: {err}")))
}

fn parse_arguments(tool_name: &str, raw: &str) -> Result<Value, ProviderError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str::<Value>(raw).map_err(|err| {
        ProviderError::Response(format!(
            "tool call arguments for '{tool_name}' are not valid JSON: {err}"
        ))
    })
}

fn build_request(
    request: &ModelRequest<'_>,
    config: &AzureOpenAIConfig,
    stream: bool,
) -> AzureChatRequest {
    let messages = ensure_non_empty_messages(to_azure_messages(request.messages));

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| AzureToolDefinition {
                    type_: "function",
                    function: AzureFunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect::<Vec<_>>(),
        )
    };

    let tool_choice = if request.tools.is_empty() {
        None
    } else {
        Some(match &request.tool_choice {
            ModelToolChoice::Auto => AzureToolChoicePayload::Mode("auto"),
            ModelToolChoice::Required => AzureToolChoicePayload::Mode("required"),
            ModelToolChoice::None => AzureToolChoicePayload::Mode("none"),
            ModelToolChoice::Tool(name) => AzureToolChoicePayload::Specific {
                type_: "function",
                function: AzureToolChoiceFunction { name: name.clone() },
            },
        })
    };

    AzureChatRequest {
        messages,
        tools,
        tool_choice,
        response_format: request.response_format.map(response_format_payload),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        stream,
    }
}

fn response_format_payload(format: &ResponseFormat) -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": format.name,
            "schema": format.schema,
            "strict": false,
        }
    })
}

fn to_azure_messages(messages: &[Message]) -> Vec<AzureRequestMessage> {
    let mut request_messages = Vec::new();

    for message in messages {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        for item in message.content() {
            match item {
                ContentItem::Text { value } => text.push_str(value),
                ContentItem::ToolCallRequest {
                    id,
                    name,
                    arguments,
                } => tool_calls.push(AzureToolCall {
                    id: id.clone(),
                    type_: "function".to_string(),
                    function: AzureToolCallFunction {
                        name: name.clone(),
                        arguments: arguments.to_string(),
                    },
                }),
                ContentItem::ToolCallResult {
                    id,
                    value,
                    is_error,
                } => tool_results.push(AzureRequestMessage::Tool {
                    tool_call_id: id.clone(),
                    content: if *is_error {
                        format!("Error: {value}")
                    } else {
                        value.clone()
                    },
                }),
                // approval bookkeeping stays local to the loop
                ContentItem::ApprovalRequest { .. } | ContentItem::ApprovalResponse { .. } => {}
            }
        }

        match message.role() {
            Role::System if !text.is_empty() => {
                request_messages.push(AzureRequestMessage::System { content: text });
            }
            Role::User if !text.is_empty() => {
                request_messages.push(AzureRequestMessage::User { content: text });
            }
            Role::Assistant if !text.is_empty() || !tool_calls.is_empty() => {
                request_messages.push(AzureRequestMessage::Assistant {
                    content: Some(text).filter(|text| !text.is_empty()),
                    tool_calls: Some(tool_calls).filter(|calls| !calls.is_empty()),
                });
            }
            Role::Tool => request_messages.extend(tool_results),
            Role::System | Role::User | Role::Assistant => {}
        }
    }

    request_messages
}

fn ensure_non_empty_messages(mut messages: Vec<AzureRequestMessage>) -> Vec<AzureRequestMessage> {
    if messages.is_empty() {
        messages.push(AzureRequestMessage::User {
            content: EMPTY_USER_CONTENT_FALLBACK.to_string(),
        });
    }

    messages
}

fn normalize_response(
    response: AzureChatCompletionResponse,
) -> Result<ModelCompletion, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Response("azure response missing choices".to_string()))?;

    let message = choice.message.ok_or_else(|| {
        ProviderError::Response("azure response missing choice message".to_string())
    })?;

    let mut content = Vec::new();
    if let Some(text) = message.content.filter(|text| !text.is_empty()) {
        content.push(ContentItem::text(text));
    }

    for tool_call in message.tool_calls {
        let arguments = parse_arguments(&tool_call.function.name, &tool_call.function.arguments)?;
        content.push(ContentItem::ToolCallRequest {
            id: tool_call.id,
            name: tool_call.function.name,
            arguments,
        });
    }

    Ok(ModelCompletion {
        content,
        usage: response.usage.map(ModelUsage::from),
    })
}

async fn extract_api_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<AzureErrorEnvelope>(&body) {
        Ok(parsed) => {
            let code = parsed
                .error
                .code
                .map(|value| match value {
                    Value::String(value) => value,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| status.as_u16().to_string());
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown azure openai error".to_string());
            format!("{code}: {message}")
        }
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => body,
    };

    tracing::warn!(status = status.as_u16(), %message, "azure chat completion failed");

    ProviderError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::ModelToolDefinition;

    const DEPLOYMENT_PATH: &str = "/openai/deployments/gpt-test/chat/completions";

    fn model_for(server: &MockServer) -> AzureOpenAIModel {
        AzureOpenAIModel::new(AzureOpenAIConfig::new(
            server.uri(),
            "test-key",
            "gpt-test",
            "2024-10-21",
        ))
        .expect("client builds")
    }

    fn weather_definition() -> ModelToolDefinition {
        ModelToolDefinition {
            name: "get_weather".to_string(),
            description: "Get the weather".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {"location": {"type": "string"}},
                "required": ["location"]
            }),
        }
    }

    #[test]
    fn from_lookup_requires_all_settings() {
        let err = AzureOpenAIConfig::from_lookup(|key| match key {
            "azure_endpoint" => Some("https://example.openai.azure.com".to_string()),
            "azure_apikey" => Some("key".to_string()),
            "azure_deployment" => Some("   ".to_string()),
            _ => Some("2024-10-21".to_string()),
        })
        .expect_err("blank deployment must fail");

        assert!(matches!(err, ConfigError::MissingSetting(ref key) if key == "azure_deployment"));
    }

    #[test]
    fn build_request_maps_tool_history_and_skips_approvals() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Weather in Chennai?"),
            Message::new(
                Role::Assistant,
                vec![ContentItem::ToolCallRequest {
                    id: "call_1".to_string(),
                    name: "get_weather".to_string(),
                    arguments: json!({"location": "Chennai"}),
                }],
            ),
            Message::new(
                Role::Assistant,
                vec![ContentItem::ApprovalRequest {
                    id: "approval_call_1".to_string(),
                    tool_call_id: "call_1".to_string(),
                }],
            ),
            Message::new(
                Role::User,
                vec![ContentItem::ApprovalResponse {
                    id: "approval_call_1".to_string(),
                    approved: false,
                }],
            ),
            Message::new(
                Role::Tool,
                vec![ContentItem::ToolCallResult {
                    id: "call_1".to_string(),
                    value: "denied".to_string(),
                    is_error: true,
                }],
            ),
        ];
        let tools = [weather_definition()];
        let format = ResponseFormat::new("CityInfo", json!({"type": "object"}));
        let request = ModelRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: ModelToolChoice::Auto,
            response_format: Some(&format),
        };

        let config = AzureOpenAIConfig::new("https://x", "k", "d", "v");
        let value = serde_json::to_value(build_request(&request, &config, false)).expect("json");

        let roles = value["messages"]
            .as_array()
            .expect("messages array")
            .iter()
            .map(|message| message["role"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(
            value["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"location\":\"Chennai\"}"
        );
        assert_eq!(value["messages"][3]["content"], "Error: denied");
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "CityInfo");
        assert!(value.get("stream").is_none());
    }

    #[tokio::test]
    async fn invoke_posts_to_deployment_and_normalizes_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOYMENT_PATH))
            .and(query_param("api-version", "2024-10-21"))
            .and(header("api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_123",
                            "type": "function",
                            "function": {
                                "name": "get_weather",
                                "arguments": "{\"location\": \"Chennai\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 15, "completion_tokens": 20}
            })))
            .mount(&server)
            .await;

        let messages = vec![Message::user("What is the weather in Chennai?")];
        let tools = [weather_definition()];
        let request = ModelRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: ModelToolChoice::Auto,
            response_format: None,
        };

        let completion = model_for(&server)
            .invoke(&request)
            .await
            .expect("request succeeds");

        assert_eq!(
            completion.content,
            vec![ContentItem::ToolCallRequest {
                id: "call_123".to_string(),
                name: "get_weather".to_string(),
                arguments: json!({"location": "Chennai"}),
            }]
        );
        assert_eq!(
            completion.usage,
            Some(ModelUsage {
                input_tokens: 15,
                output_tokens: 20,
            })
        );
    }

    #[tokio::test]
    async fn error_status_is_surfaced_with_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEPLOYMENT_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": "429", "message": "Rate limit exceeded"}
            })))
            .mount(&server)
            .await;

        let messages = vec![Message::user("hi")];
        let request = ModelRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ModelToolChoice::None,
            response_format: None,
        };

        let err = model_for(&server)
            .invoke(&request)
            .await
            .expect_err("must fail");

        match err {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 429);
                assert!(message.contains("Rate limit exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn invoke_stream_yields_text_deltas_then_assembled_tool_calls() {
        let server = MockServer::start().await;
        let body = [
            json!({"choices": [], "prompt_filter_results": []}),
            json!({"choices": [{"delta": {"role": "assistant", "content": "The "}}]}),
            json!({"choices": [{"delta": {"content": "capital "}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0, "id": "call_9", "type": "function",
                "function": {"name": "get_weather", "arguments": "{\"loca"}
            }]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [{
                "index": 0, "function": {"arguments": "tion\":\"Paris\"}"}
            }]}}]}),
            json!({"choices": [{"delta": {"content": "is Paris."}}]}),
        ]
        .iter()
        .map(|chunk| format!("data: {chunk}\n\n"))
        .collect::<String>()
            + "data: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path(DEPLOYMENT_PATH))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let messages = vec![Message::user("What is the capital of France?")];
        let request = ModelRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ModelToolChoice::None,
            response_format: None,
        };

        let model = model_for(&server);
        let chunks = model
            .invoke_stream(&request)
            .try_collect::<Vec<_>>()
            .await
            .expect("stream succeeds");

        assert_eq!(
            chunks,
            vec![
                ModelStreamChunk::TextDelta("The ".to_string()),
                ModelStreamChunk::TextDelta("capital ".to_string()),
                ModelStreamChunk::TextDelta("is Paris.".to_string()),
                ModelStreamChunk::ToolCall(ToolCall::new(
                    "call_9",
                    "get_weather",
                    json!({"location": "Paris"})
                )),
            ]
        );
    }

    #[test]
    fn normalize_response_fails_on_invalid_tool_arguments() {
        let err = normalize_response(AzureChatCompletionResponse {
            choices: vec![AzureChoice {
                message: Some(AzureAssistantMessage {
                    content: None,
                    tool_calls: vec![AzureToolCall {
                        id: "call_x".to_string(),
                        type_: "function".to_string(),
                        function: AzureToolCallFunction {
                            name: "lookup".to_string(),
                            arguments: "{not json}".to_string(),
                        },
                    }],
                }),
            }],
            usage: None,
        })
        .expect_err("should fail");

        assert!(err.to_string().contains("not valid JSON"));
    }
}
