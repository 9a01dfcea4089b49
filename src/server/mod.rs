//! Server lifecycle coordinator.
//!
//! Owns the configured transport bindings, starts them concurrently, waits
//! for cancellation, and drives a bounded, best-effort-parallel shutdown.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hooks::Hooks;
use crate::protocol::types::ServerInfo;
use crate::protocol::Dispatcher;
use crate::registry::CapabilityRegistry;
use crate::transport::{SseBinding, StdioBinding, StreamableHttpBinding, TransportBinding};
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Default bound on how long a binding may take to stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Running,
    ShuttingDown,
    Stopped,
}

/// The multi-transport MCP server.
pub struct McpServer {
    bindings: Vec<Arc<dyn TransportBinding>>,
    state: RwLock<LifecycleState>,
    shutdown_timeout: Duration,
    // Gate serializing shutdown; holds the aggregated result so repeated
    // stops observe the same outcome.
    stop_result: Mutex<Option<Result<(), ServerError>>>,
}

impl McpServer {
    fn new(bindings: Vec<Arc<dyn TransportBinding>>, shutdown_timeout: Duration) -> Self {
        Self {
            bindings,
            state: RwLock::new(LifecycleState::Unstarted),
            shutdown_timeout,
            stop_result: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Start every configured binding and run until the token is cancelled.
    ///
    /// Returns the aggregated shutdown result once every binding has been
    /// stopped (or timed out).
    #[instrument(skip_all)]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        if self.bindings.is_empty() {
            return Err(ServerError::NoTransportConfigured);
        }

        for (index, binding) in self.bindings.iter().enumerate() {
            info!("Starting {} transport...", binding.name());
            if let Err(e) = binding.start(cancel.child_token()).await {
                error!("Failed to start {} transport: {}", binding.name(), e);
                // Unwind what already started before reporting the failure.
                let mut cached = self.stop_result.lock().await;
                *self.state.write() = LifecycleState::ShuttingDown;
                let unwind = self.stop_bindings(&self.bindings[..index]).await;
                *self.state.write() = LifecycleState::Stopped;
                *cached = Some(unwind);
                return Err(e);
            }
        }
        *self.state.write() = LifecycleState::Running;
        info!("Server running with {} transport(s)", self.bindings.len());

        cancel.cancelled().await;
        info!("Cancellation received, shutting down server...");
        self.stop().await
    }

    /// Stop every binding concurrently, each bounded by the shutdown timeout.
    ///
    /// Best-effort-parallel: one binding's failure does not abort the others,
    /// and the coordinator always reaches `Stopped`. The first error observed
    /// is the aggregated result, cached for repeat calls. Before `run`, this
    /// is a no-op.
    pub async fn stop(&self) -> Result<(), ServerError> {
        let mut cached = self.stop_result.lock().await;
        if let Some(result) = cached.as_ref() {
            return result.clone();
        }
        if self.state() == LifecycleState::Unstarted {
            return Ok(());
        }

        *self.state.write() = LifecycleState::ShuttingDown;
        info!("Shutting down server gracefully...");

        let result = self.stop_bindings(&self.bindings).await;

        *self.state.write() = LifecycleState::Stopped;
        match &result {
            Ok(()) => info!("Server exited properly"),
            Err(e) => warn!("Server shutdown encountered issues: {}", e),
        }

        *cached = Some(result.clone());
        result
    }

    /// Stop the given bindings concurrently; first error wins as the
    /// aggregated result.
    async fn stop_bindings(
        &self,
        bindings: &[Arc<dyn TransportBinding>],
    ) -> Result<(), ServerError> {
        let timeout = self.shutdown_timeout;
        let stops = bindings.iter().map(|binding| {
            let binding = Arc::clone(binding);
            async move {
                match tokio::time::timeout(timeout, binding.stop()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("Failed to stop {} transport: {}", binding.name(), e);
                        Err(e)
                    }
                    Err(_) => {
                        error!("{} transport did not stop in time", binding.name());
                        Err(ServerError::ShutdownTimeout {
                            transport: binding.name(),
                        })
                    }
                }
            }
        });

        join_all(stops)
            .await
            .into_iter()
            .find_map(Result::err)
            .map_or(Ok(()), Err)
    }
}

/// Builder for [`McpServer`].
pub struct McpServerBuilder {
    dispatcher: Option<Arc<Dispatcher>>,
    bindings: Vec<Arc<dyn TransportBinding>>,
    stdio: bool,
    sse: Option<(String, String)>,
    http: Option<(String, String)>,
    shutdown_timeout: Duration,
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            dispatcher: None,
            bindings: Vec::new(),
            stdio: false,
            sse: None,
            http: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Wire registry, hooks and identity into one dispatcher shared by every
    /// binding.
    pub fn dispatcher(
        mut self,
        registry: Arc<CapabilityRegistry>,
        hooks: Arc<Hooks>,
        server_info: ServerInfo,
        instructions: Option<String>,
    ) -> Self {
        self.dispatcher = Some(Arc::new(Dispatcher::new(
            registry,
            hooks,
            server_info,
            instructions,
        )));
        self
    }

    pub fn with_stdio(mut self, enabled: bool) -> Self {
        self.stdio = enabled;
        self
    }

    pub fn with_sse(mut self, addr: impl Into<String>, path: impl Into<String>) -> Self {
        self.sse = Some((addr.into(), path.into()));
        self
    }

    pub fn with_streamable_http(
        mut self,
        addr: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        self.http = Some((addr.into(), path.into()));
        self
    }

    /// Add a pre-built binding (used by tests and embedders).
    pub fn binding(mut self, binding: Arc<dyn TransportBinding>) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Apply the transport toggles from a [`ServerConfig`].
    pub fn from_config(mut self, config: &ServerConfig) -> Self {
        self.stdio = config.stdio;
        if let Some(sse) = &config.sse {
            self.sse = Some((sse.addr.clone(), sse.path.clone()));
        }
        if let Some(http) = &config.http {
            self.http = Some((http.addr.clone(), http.path.clone()));
        }
        self.shutdown_timeout = config.shutdown_timeout;
        self
    }

    pub fn build(self) -> Result<McpServer, ServerError> {
        let mut bindings = self.bindings;

        if self.stdio || self.sse.is_some() || self.http.is_some() {
            let dispatcher = self.dispatcher.ok_or(ServerError::StartFailed {
                transport: "builder",
                message: "dispatcher is required".into(),
            })?;

            if self.stdio {
                bindings.push(Arc::new(StdioBinding::new(Arc::clone(&dispatcher))));
            }
            if let Some((addr, path)) = self.sse {
                bindings.push(Arc::new(SseBinding::new(
                    Arc::clone(&dispatcher),
                    addr,
                    path,
                )));
            }
            if let Some((addr, path)) = self.http {
                bindings.push(Arc::new(StreamableHttpBinding::new(dispatcher, addr, path)));
            }
        }

        Ok(McpServer::new(bindings, self.shutdown_timeout))
    }
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
