use std::error::Error;

use agent_turn_sdk::{Agent, AzureOpenAIModel, ToolOutput, ToolSpec};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, JsonSchema)]
struct WeatherArgs {
    /// The location to get weather for.
    location: String,
}

fn weather_tool() -> ToolSpec {
    ToolSpec::typed(
        "get_weather",
        "Get the weather for a given location.",
        |args: WeatherArgs| async move {
            Ok(ToolOutput::Text(format!(
                "The weather in {} is rainy for the next 2 days.",
                args.location
            )))
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut agent = Agent::builder()
        .model(AzureOpenAIModel::from_env()?)
        .name("Indian-Agent")
        .system_prompt("You are my Indian Agent. Use tools to answer questions.")
        .tool(weather_tool())
        .build()?;

    let outcome = agent.run("What is the weather in Chennai?").await?;
    println!("{}", outcome.into_final().unwrap_or_default());

    Ok(())
}
