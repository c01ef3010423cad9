use std::collections::VecDeque;
use std::error::Error;
use std::sync::Mutex;

use agent_turn_sdk::{
    Agent, ApprovalDecision, ChatModel, ModelCompletion, ModelRequest, ProviderError, RunOutcome,
    ToolCall, ToolError, ToolOutput, ToolSpec,
};
use async_trait::async_trait;
use serde_json::json;
use tracing_subscriber::EnvFilter;

struct ScriptedModel {
    responses: Mutex<VecDeque<ModelCompletion>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ModelCompletion>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, _request: &ModelRequest<'_>) -> Result<ModelCompletion, ProviderError> {
        let mut guard = self
            .responses
            .lock()
            .map_err(|_| ProviderError::Response("lock poisoned".to_string()))?;
        guard.pop_front().ok_or_else(|| {
            ProviderError::Response("scripted model exhausted responses".to_string())
        })
    }
}

fn add_tool() -> ToolSpec {
    ToolSpec::new("add", "add two numbers")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|args| async move {
            let a = args
                .get("a")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ToolError::Execution("a missing".to_string()))?;
            let b = args
                .get("b")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| ToolError::Execution("b missing".to_string()))?;
            Ok(ToolOutput::Text((a + b).to_string()))
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let model = ScriptedModel::new(vec![
        ModelCompletion::tool_calls(vec![
            ToolCall::new("call_1", "add", json!({"a": 2, "b": 3})),
            ToolCall::new("call_2", "add", json!({"a": 10, "b": 7})),
        ]),
        ModelCompletion::text("2 + 3 = 5 and 10 + 7 = 17"),
        ModelCompletion::tool_calls(vec![ToolCall::new(
            "call_3",
            "add",
            json!({"a": 40, "b": 2}),
        )]),
        ModelCompletion::text("40 + 2 = 42"),
    ]);

    let mut agent = Agent::builder()
        .model(model)
        .tool(add_tool().require_approval())
        .max_rounds(4)
        .build()?;

    let RunOutcome::ApprovalRequired(pending) = agent.run("Add 2+3 and 10+7").await? else {
        return Err("expected approval request".into());
    };
    println!("{} calls awaiting approval", pending.len());

    let decisions = pending
        .iter()
        .map(|request| ApprovalDecision::approve(request.tool_call_id.clone()))
        .collect();
    let outcome = agent.resume(decisions).await?;
    println!("final: {}", outcome.into_final().unwrap_or_default());

    let RunOutcome::ApprovalRequired(pending) = agent.run("Now 40+2").await? else {
        return Err("expected approval request".into());
    };
    let outcome = agent
        .resume(vec![ApprovalDecision::deny(pending[0].tool_call_id.clone())])
        .await?;
    println!("after denial: {}", outcome.into_final().unwrap_or_default());
    println!("history length: {}", agent.messages_len());

    Ok(())
}
