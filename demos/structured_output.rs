use std::error::Error;

use agent_turn_sdk::{Agent, AzureOpenAIModel, RunOutcome, ToolOutput, ToolSpec};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, JsonSchema)]
struct CityInfo {
    name: Option<String>,
    weather: Option<String>,
}

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
        .system_prompt(
            "You figure out the city from the information provided and also return its weather.",
        )
        .tool(weather)
        .build()?;

    if let RunOutcome::Final(city) = agent
        .run_structured::<CityInfo>("I am at the Marina beach.")
        .await?
    {
        println!("{city:?}");
    }

    Ok(())
}
