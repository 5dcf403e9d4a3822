//! Per-service MCP adapters built on `toolbridge-core`.
//!
//! Each module owns one upstream: its clap configuration, its service client and its
//! [`ToolSet`](toolbridge_core::tools::ToolSet). The binaries under `src/bin` only parse
//! arguments and hand the tool set to [`toolbridge_core::run`].

pub mod clickup;
pub mod figma;
pub mod jira;
pub mod notion;
pub mod paypal;
pub mod postgres;
pub mod rippling;
pub mod salesforce;
