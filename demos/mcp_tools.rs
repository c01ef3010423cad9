use std::error::Error;

use agent_turn_sdk::{Agent, ApprovalMode, AzureOpenAIModel, McpClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = ["run", "-i", "--rm", "duckduckgo-mcp-server:latest"]
        .map(String::from);
    let ddg = McpClient::spawn("duckduckgo", "docker", &args).await?;
    for tool in ddg.tools() {
        println!("mcp tool: {}", tool.name);
    }

    let mut agent = Agent::builder()
        .model(AzureOpenAIModel::from_env()?)
        .system_prompt("You search the web to answer questions. Cite your sources.")
        .tools(ddg.tool_specs(ApprovalMode::Auto))
        .build()?;

    let outcome = agent.run("What is the latest Rust release?").await?;
    println!("{}", outcome.into_final().unwrap_or_default());

    ddg.close().await?;
    Ok(())
}
