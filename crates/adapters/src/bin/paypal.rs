use clap::Parser;
use toolbridge_adapters::paypal::{PayPal, PayPalConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for the PayPal REST API (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-paypal", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    paypal: PayPalConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = PayPal::new(&cli.paypal, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
