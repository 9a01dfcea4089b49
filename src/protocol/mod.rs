//! MCP protocol implementation: wire types and the method dispatcher.

pub mod dispatch;
pub mod types;

pub use dispatch::Dispatcher;
pub use types::*;
