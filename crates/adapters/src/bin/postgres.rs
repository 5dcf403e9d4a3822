use clap::Parser;
use toolbridge_adapters::postgres::{Postgres, PostgresConfig};
use toolbridge_core::config::CommonArgs;

/// Read-only MCP server for a PostgreSQL database (stdio).
#[derive(Debug, Parser)]
#[command(name = "toolbridge-postgres", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    postgres: PostgresConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.common.init_tracing()?;
    let adapter = Postgres::new(&cli.postgres)?;
    toolbridge_core::run(adapter).await
}
