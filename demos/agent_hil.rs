use std::error::Error;

use agent_turn_sdk::{
    Agent, ApprovalDecision, AzureOpenAIModel, RunEvent, RunOutcome, ToolOutput, ToolSpec,
};
use futures_util::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    location: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let weather = ToolSpec::typed(
        "get_weather",
        "Get the weather for a given location.",
        |args: WeatherArgs| async move {
            Ok(ToolOutput::Text(format!(
                "The weather in {} is rainy for the next 2 days.",
                args.location
            )))
        },
    )
    .require_approval();

    let mut agent = Agent::builder()
        .model(AzureOpenAIModel::from_env()?)
        .name("Indian-Agent")
        .system_prompt("You are my Indian Agent, you know all about India.")
        .tool(weather)
        .build()?;

    let mut pending = Vec::new();
    {
        let stream = agent.run_stream("What is the weather in Chennai?");
        futures_util::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event? {
                RunEvent::TextDelta { content } => print!("{content}"),
                RunEvent::ToolCall {
                    tool, tool_call_id, ..
                } => println!("[call {tool_call_id}] {tool}"),
                RunEvent::ApprovalRequired { requests } => pending = requests,
                RunEvent::ToolResult { .. } | RunEvent::Final { .. } => {}
            }
        }
    }

    if pending.is_empty() {
        return Ok(());
    }

    let decisions = pending
        .iter()
        .map(|request| {
            println!("approving {} with {}", request.tool_name, request.arguments);
            ApprovalDecision::approve(request.tool_call_id.clone())
        })
        .collect();

    match agent.resume(decisions).await? {
        RunOutcome::Final(text) => println!("{text}"),
        RunOutcome::ApprovalRequired(more) => println!("{} more approvals needed", more.len()),
    }

    Ok(())
}
