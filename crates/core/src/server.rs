//! rmcp server handler that exposes a [`ToolSet`] over MCP.

use crate::envelope::Envelope;
use crate::error::AdapterError;
use crate::tools::{ToolSet, ToolSpec, parse_call};
use anyhow::Context as _;
use futures::FutureExt as _;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ErrorCode, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt as _};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct AdapterServer<T: ToolSet> {
    toolset: Arc<T>,
    tools: Arc<[ToolSpec]>,
}

impl<T: ToolSet> Clone for AdapterServer<T> {
    fn clone(&self) -> Self {
        Self {
            toolset: self.toolset.clone(),
            tools: self.tools.clone(),
        }
    }
}

impl<T: ToolSet> AdapterServer<T> {
    pub fn new(toolset: T) -> Self {
        let tools: Arc<[ToolSpec]> = toolset.tools().into();
        Self {
            toolset: Arc::new(toolset),
            tools,
        }
    }

    #[must_use]
    pub fn toolset(&self) -> &Arc<T> {
        &self.toolset
    }

    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolSpec::to_tool).collect()
    }

    /// Resolve, parse, execute and format one tool call.
    ///
    /// Protocol errors are reserved for unknown tools, invalid params and handler panics.
    /// Everything else, upstream failures included, becomes an `isError` result.
    ///
    /// # Errors
    ///
    /// `METHOD_NOT_FOUND`, `INVALID_PARAMS` or `INTERNAL_ERROR` as described above.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(to_mcp_error(AdapterError::MethodNotFound(name.to_string())));
        }
        let call = parse_call::<T::Call>(name, arguments).map_err(to_mcp_error)?;

        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.toolset.invoke(call))
            .catch_unwind()
            .await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let envelope = match outcome {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e @ AdapterError::InvalidParams(_))) => return Err(to_mcp_error(e)),
            Ok(Err(e)) => {
                warn!(tool = %name, elapsed_ms, error = %e, "tool call failed");
                Envelope::from(e)
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!(tool = %name, panic = %msg, "tool handler panicked");
                return Err(McpError::internal_error(
                    format!("tool '{name}' failed: {msg}"),
                    None,
                ));
            }
        };

        info!(tool = %name, success = envelope.success, elapsed_ms, "tool call finished");
        Ok(envelope.into_call_result())
    }
}

fn to_mcp_error(e: AdapterError) -> McpError {
    match e {
        AdapterError::MethodNotFound(_) => {
            McpError::new(ErrorCode::METHOD_NOT_FOUND, e.to_string(), None)
        }
        AdapterError::InvalidParams(msg) => McpError::invalid_params(msg, None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl<T: ToolSet> ServerHandler for AdapterServer<T> {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info.name = self.toolset.name().to_string();
        info.server_info.version = self.toolset.version().to_string();
        info.instructions = self.toolset.instructions();
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(request.name.as_ref(), request.arguments).await
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .map(ToolSpec::to_tool)
    }
}

/// How long a signalled shutdown waits for the MCP service task before giving up on it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Wait up to `grace` for the cancelled service task, then abandon it.
///
/// A slow service never turns a signalled shutdown into a failure.
async fn stop_service<R>(waiter: &mut JoinHandle<R>, grace: Duration) {
    if tokio::time::timeout(grace, &mut *waiter).await.is_err() {
        warn!(
            grace_secs = grace.as_secs(),
            "MCP service did not stop in time; exiting anyway"
        );
        waiter.abort();
    }
}

/// Serve `toolset` over stdio until the client disconnects or `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the MCP handshake fails or the service task dies unexpectedly.
pub async fn serve_stdio<T: ToolSet>(toolset: T, shutdown: CancellationToken) -> anyhow::Result<()> {
    let server = AdapterServer::new(toolset);
    let toolset = server.toolset().clone();
    info!(
        adapter = toolset.name(),
        tools = server.tools.len(),
        "serving MCP over stdio"
    );

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("failed to start MCP stdio server")?;
    let cancellation = service.cancellation_token();
    let mut waiter = tokio::spawn(async move { service.waiting().await });

    let result = tokio::select! {
        () = shutdown.cancelled() => {
            cancellation.cancel();
            stop_service(&mut waiter, SHUTDOWN_GRACE).await;
            Ok(())
        }
        joined = &mut waiter => match joined {
            Ok(Ok(_)) => {
                info!("MCP client disconnected");
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow::anyhow!("MCP service task failed: {e}")),
            Err(e) => Err(anyhow::anyhow!("MCP service task panicked: {e}")),
        },
    };

    toolset.shutdown().await;
    result
}
