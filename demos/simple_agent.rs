use std::error::Error;

use agent_turn_sdk::{Agent, AzureOpenAIModel, RunOutcome};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut agent = Agent::builder()
        .model(AzureOpenAIModel::from_env()?)
        .name("Indian-Agent")
        .system_prompt("You are my Indian Agent, you know all about India.")
        .build()?;

    match agent.run("What is the capital of Tamil Nadu?").await? {
        RunOutcome::Final(text) => println!("{text}"),
        RunOutcome::ApprovalRequired(pending) => println!("unexpected approvals: {pending:?}"),
    }

    Ok(())
}
