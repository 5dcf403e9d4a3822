use clap::Parser;
use toolbridge_adapters::rippling::{Rippling, RipplingConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for Rippling (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-rippling", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    rippling: RipplingConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Rippling::new(&cli.rippling, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
