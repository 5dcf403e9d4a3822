use clap::Parser;
use toolbridge_adapters::figma::{DEFAULT_TIMEOUT, Figma, FigmaConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for Figma (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-figma", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    figma: FigmaConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Figma::new(&cli.figma, cli.common.request_timeout(Some(DEFAULT_TIMEOUT)))?;
    toolbridge_core::run(adapter).await
}
