//! Shared building blocks for toolbridge MCP adapters.
//!
//! Every adapter binary is the same pipeline: a [`tools::ToolSet`] (catalog + typed calls)
//! served by [`server::AdapterServer`] over stdio, with upstream calls going through
//! [`http::RestClient`].

pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod paginate;
pub mod server;
pub mod shutdown;
pub mod token;
pub mod tools;

pub use envelope::Envelope;
pub use error::{AdapterError, Result};

/// Serve `toolset` over stdio until the client disconnects or the process is signalled.
///
/// # Errors
///
/// Returns an error if the MCP transport fails.
pub async fn run<T: tools::ToolSet>(toolset: T) -> anyhow::Result<()> {
    let shutdown = shutdown::shutdown_on_signal();
    server::serve_stdio(toolset, shutdown.clone()).await?;
    if shutdown.is_cancelled() {
        // The stdio transport's blocking stdin read cannot be interrupted and would keep the
        // runtime from shutting down.
        tracing::info!("adapter stopped by signal");
        std::process::exit(0);
    }
    Ok(())
}
