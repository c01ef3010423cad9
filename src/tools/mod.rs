pub mod mcp;

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};
use crate::llm::ModelToolDefinition;
use crate::schema::{validate_tool_schema, validate_value};

/// Whether a tool may run as soon as the model asks for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApprovalMode {
    #[default]
    Auto,
    AlwaysRequire,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Renders the output the way it is sent back to the model.
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(Value::String(text)) => text,
            ToolOutput::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

type ToolHandler =
    dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    approval_mode: ApprovalMode,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .field("approval_mode", &self.approval_mode)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            approval_mode: ApprovalMode::Auto,
            handler: Arc::new(|_args| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    /// Builds a tool whose arguments are deserialized into `A` and whose
    /// parameter schema is derived from `A`'s `JsonSchema` impl.
    pub fn typed<A, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Self
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let name = name.into();
        let mut schema = schemars::schema_for!(A).to_value();
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }

        let tool_name = name.clone();
        let mut spec = Self::new(name, description);
        spec.json_schema = schema;
        spec.handler = Arc::new(move |args| match serde_json::from_value::<A>(args) {
            Ok(parsed) => handler(parsed).boxed(),
            Err(err) => future::ready(Err(ToolError::InvalidArguments {
                tool: tool_name.clone(),
                message: err.to_string(),
            }))
            .boxed(),
        });
        spec
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_tool_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn with_approval_mode(mut self, approval_mode: ApprovalMode) -> Self {
        self.approval_mode = approval_mode;
        self
    }

    /// Shorthand for `with_approval_mode(ApprovalMode::AlwaysRequire)`.
    pub fn require_approval(self) -> Self {
        self.with_approval_mode(ApprovalMode::AlwaysRequire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        self.approval_mode
    }

    pub fn definition(&self) -> ModelToolDefinition {
        ModelToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema.clone(),
        }
    }

    pub async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        if !args.is_object() {
            return Err(self.invalid("arguments must be a JSON object"));
        }
        validate_value(&self.json_schema, &args).map_err(|message| self.invalid(message))?;
        (self.handler)(args).await
    }

    fn invalid(&self, message: impl Into<String>) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.name.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize, JsonSchema)]
    struct WeatherArgs {
        /// The location to get weather for
        location: String,
    }

    fn weather_tool() -> ToolSpec {
        ToolSpec::typed("get_weather", "Get the weather", |args: WeatherArgs| async move {
            Ok(ToolOutput::Text(format!(
                "The weather in {} is rainy for the next 2 days.",
                args.location
            )))
        })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(result.is_err());
    }

    #[test]
    fn tools_default_to_auto_approval() {
        let tool = ToolSpec::new("noop", "noop");
        assert_eq!(tool.approval_mode(), ApprovalMode::Auto);
        assert_eq!(
            tool.require_approval().approval_mode(),
            ApprovalMode::AlwaysRequire
        );
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let tool = ToolSpec::new("req", "required")
            .with_schema(json!({
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|_args| async move { Ok(ToolOutput::from("ok")) });

        let err = tool.execute(json!({})).await.expect_err("should fail");
        assert!(err.to_string().contains("missing required field"));

        let err = tool
            .execute(json!({"value": "x", "extra": 1}))
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("unknown field: extra"));
    }

    #[tokio::test]
    async fn typed_tool_derives_schema_and_decodes_arguments() {
        let tool = weather_tool();

        assert_eq!(tool.json_schema()["type"], "object");
        assert_eq!(
            tool.json_schema()["properties"]["location"]["type"],
            "string"
        );
        assert!(tool.json_schema().get("$schema").is_none());

        let output = tool
            .execute(json!({"location": "Chennai"}))
            .await
            .expect("tool executes");
        assert_eq!(
            output.into_text(),
            "The weather in Chennai is rainy for the next 2 days."
        );
    }

    #[tokio::test]
    async fn typed_tool_rejects_wrongly_typed_arguments() {
        let err = weather_tool()
            .execute(json!({"location": 42}))
            .await
            .expect_err("should fail");

        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn json_output_renders_compactly() {
        let output = ToolOutput::Json(json!({"temp": 31}));
        assert_eq!(output.into_text(), "{\"temp\":31}");
    }
}
