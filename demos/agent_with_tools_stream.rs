use std::error::Error;
use std::io::Write;

use agent_turn_sdk::{Agent, AzureOpenAIModel, RunEvent, ToolOutput, ToolSpec};
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
    );

    let mut agent = Agent::builder()
        .model(AzureOpenAIModel::from_env()?)
        .system_prompt("You are my Indian Agent. Use tools to answer questions.")
        .tool(weather)
        .build()?;

    let stream = agent.run_stream("What is the weather in Chennai and Mumbai?");
    futures_util::pin_mut!(stream);
    while let Some(event) = stream.next().await {
        match event? {
            RunEvent::TextDelta { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
            }
            RunEvent::ToolCall {
                tool,
                args_json,
                tool_call_id,
            } => println!("\n[tool call {tool_call_id}] {tool}: {args_json}"),
            RunEvent::ToolResult {
                tool,
                result_text,
                is_error,
                ..
            } => println!("[tool result] {tool}: {result_text} (error={is_error})"),
            RunEvent::ApprovalRequired { requests } => {
                println!("approval required for {} call(s)", requests.len())
            }
            RunEvent::Final { .. } => println!(),
        }
    }

    Ok(())
}
