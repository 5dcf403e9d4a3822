use clap::Parser;
use toolbridge_adapters::salesforce::{Salesforce, SalesforceConfig};
use toolbridge_core::config::CommonArgs;

/// MCP server for Salesforce (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-salesforce", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    salesforce: SalesforceConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Salesforce::new(cli.salesforce, cli.common.request_timeout(None))?;
    toolbridge_core::run(adapter).await
}
