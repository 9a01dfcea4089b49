//! Streamable HTTP transport binding.
//!
//! A single endpoint: `POST {path}` carries one JSON-RPC request and answers
//! with an SSE-framed stream — every notification the handler emits while the
//! call is in flight, then the terminal response. Each POST is its own
//! session, so progress fan-out lands on the connection that asked for it.

use crate::error::ServerError;
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::Dispatcher;
use crate::session::Session;
use crate::transport::TransportBinding;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

const EVENT_QUEUE_DEPTH: usize = 64;

struct HttpState {
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
}

/// Transport binding serving the streamable-HTTP flavor of the protocol.
pub struct StreamableHttpBinding {
    addr: String,
    path: String,
    state: Arc<HttpState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamableHttpBinding {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        addr: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            addr: addr.into(),
            path: path.into(),
            state: Arc::new(HttpState {
                dispatcher,
                cancel: shutdown.clone(),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route(&self.path, post(post_request).get(method_not_allowed))
            .with_state(Arc::clone(&self.state))
    }
}

#[async_trait]
impl TransportBinding for StreamableHttpBinding {
    fn name(&self) -> &'static str {
        "streamable-http"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ServerError::StartFailed {
                transport: "streamable-http",
                message: e.to_string(),
            })?;
        info!(
            "StreamableHTTP transport listening on {}{}",
            self.addr, self.path
        );

        let router = self.router();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = shutdown.cancelled() => {}
                }
            });
            if let Err(e) = serve.await {
                error!("StreamableHTTP server error: {}", e);
            }
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                return Err(ServerError::StopFailed {
                    transport: "streamable-http",
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

/// `POST {path}`: one request, one per-request session, one response stream.
async fn post_request(State(state): State<Arc<HttpState>>, body: String) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to parse message: {}", e);
            let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    if request.is_notification() {
        let session = Session::detached("streamable-http");
        state
            .dispatcher
            .dispatch(request, &session, state.cancel.child_token())
            .await;
        return StatusCode::ACCEPTED.into_response();
    }

    let id = Uuid::new_v4().to_string();
    debug!(session = %id, method = %request.method, "StreamableHTTP request");

    let (session, mut notifications) = Session::channel(id, "streamable-http");
    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_QUEUE_DEPTH);

    let dispatcher = Arc::clone(&state.dispatcher);
    let cancel = state.cancel.child_token();
    tokio::spawn(async move {
        // Drain notifications onto the stream while the handler runs.
        let notify_tx = events_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(frame) = notifications.recv().await {
                match serde_json::to_string(&frame) {
                    Ok(data) => {
                        if notify_tx
                            .send(Event::default().event("message").data(data))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => error!("Failed to encode notification: {}", e),
                }
            }
        });

        let response = dispatcher.dispatch(request, &session, cancel).await;

        // Close the notification path and flush what is queued before the
        // terminal response goes out.
        drop(session);
        let _ = forwarder.await;

        if let Some(response) = response {
            match serde_json::to_string(&response) {
                Ok(data) => {
                    let _ = events_tx
                        .send(Event::default().event("message").data(data))
                        .await;
                }
                Err(e) => error!("Failed to encode response: {}", e),
            }
        }
    });

    Sse::new(ReceiverStream::new(events_rx).map(Ok::<_, std::convert::Infallible>))
        .keep_alive(KeepAlive::default())
        .into_response()
}
