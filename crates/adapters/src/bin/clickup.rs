use clap::Parser;
use toolbridge_adapters::clickup::{ClickUp, ClickUpConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for ClickUp (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-clickup", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    clickup: ClickUpConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = ClickUp::new(&cli.clickup, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
