use clap::Parser;
use toolbridge_adapters::jira::{Jira, JiraConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for Jira Cloud (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-jira", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    jira: JiraConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Jira::new(&cli.jira, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
