//! Transport bindings: adapters carrying the protocol over a concrete mechanism.
//!
//! Every binding decodes its own framing into [`crate::protocol::JsonRpcRequest`]
//! before entering dispatch and encodes responses/notifications back out. The
//! lifecycle coordinator treats all bindings uniformly through
//! [`TransportBinding`].

pub mod http;
pub mod sse;
pub mod stdio;

use crate::error::ServerError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use http::StreamableHttpBinding;
pub use sse::SseBinding;
pub use stdio::StdioBinding;

/// A transport binding's lifecycle contract.
#[async_trait]
pub trait TransportBinding: Send + Sync {
    /// Short name used in logs and shutdown errors.
    fn name(&self) -> &'static str;

    /// Begin accepting connections.
    ///
    /// Returns once the binding is listening/attached; the accept loop runs as
    /// a spawned task supervised through the cancellation token.
    async fn start(&self, cancel: CancellationToken) -> Result<(), ServerError>;

    /// Stop the binding. Idempotent, and safe to call even if `start` never
    /// completed successfully.
    async fn stop(&self) -> Result<(), ServerError>;
}
