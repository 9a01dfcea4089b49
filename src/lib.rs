//! MCP server exercising the full protocol surface over multiple transports.
//!
//! Exposes sample tools, resources and prompts through stdio, SSE and
//! streamable HTTP bindings, with a hook pipeline around request handling
//! and progress notifications back to the calling session.
//!
//! # Example
//!
//! ```no_run
//! use everything_mcp::{
//!     config::ServerConfig,
//!     handlers,
//!     hooks::Hooks,
//!     protocol::types::ServerInfo,
//!     registry::CapabilityRegistry,
//!     server::McpServerBuilder,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut registry = CapabilityRegistry::default();
//!     handlers::register_all(&mut registry)?;
//!
//!     let config = ServerConfig::default();
//!     let server = McpServerBuilder::new()
//!         .dispatcher(
//!             Arc::new(registry),
//!             Arc::new(Hooks::default()),
//!             ServerInfo {
//!                 name: config.name.clone(),
//!                 version: config.version.clone(),
//!             },
//!             config.instructions.clone(),
//!         )
//!         .from_config(&config)
//!         .build()?;
//!
//!     server.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{McpError, ProtocolError, Result};
pub use hooks::{HookEvent, HookStage, Hooks, InitializeVeto};
pub use protocol::Dispatcher;
pub use registry::{CapabilityRegistry, PromptHandler, ResourceHandler, ToolBuilder, ToolHandler};
pub use server::{McpServer, McpServerBuilder};
pub use session::{NotificationSender, RequestContext, Session};
pub use transport::{SseBinding, StdioBinding, StreamableHttpBinding, TransportBinding};
