use clap::Parser;
use toolbridge_adapters::notion::{Notion, NotionConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for Notion (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-notion", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    notion: NotionConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Notion::new(&cli.notion, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
