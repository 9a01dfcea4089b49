//! SSE transport binding.
//!
//! `GET {path}` opens the event stream for a new session; the first event is
//! an `endpoint` frame telling the client where to POST its requests. The
//! client then drives the session through `POST {path}/message?sessionId=`,
//! and responses plus any notifications come back as `message` events on the
//! stream. Dropping the stream closes the session.

use crate::error::ServerError;
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::Dispatcher;
use crate::session::Session;
use crate::transport::TransportBinding;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use futures::stream::Stream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const EVENT_QUEUE_DEPTH: usize = 64;

struct SseSession {
    session: Arc<Session>,
    events: mpsc::Sender<Event>,
}

struct SseState {
    dispatcher: Arc<Dispatcher>,
    sessions: DashMap<String, SseSession>,
    path: String,
    cancel: CancellationToken,
}

/// Transport binding serving the SSE flavor of the protocol.
pub struct SseBinding {
    addr: String,
    state: Arc<SseState>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SseBinding {
    pub fn new(dispatcher: Arc<Dispatcher>, addr: impl Into<String>, path: impl Into<String>) -> Self {
        let shutdown = CancellationToken::new();
        Self {
            addr: addr.into(),
            state: Arc::new(SseState {
                dispatcher,
                sessions: DashMap::new(),
                path: path.into(),
                cancel: shutdown.clone(),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        let message_path = format!("{}/message", self.state.path);
        Router::new()
            .route(&self.state.path, get(open_stream))
            .route(&message_path, post(post_message))
            .with_state(Arc::clone(&self.state))
    }
}

#[async_trait]
impl TransportBinding for SseBinding {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| ServerError::StartFailed {
                transport: "sse",
                message: e.to_string(),
            })?;
        info!("SSE transport listening on {}{}", self.addr, self.state.path);

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
                error!("SSE server error: {}", e);
            }
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        self.state.sessions.clear();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                return Err(ServerError::StopFailed {
                    transport: "sse",
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `GET {path}`: promote the connection to a session and stream its events.
async fn open_stream(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = Uuid::new_v4().to_string();
    let (events_tx, events_rx) = mpsc::channel::<Event>(EVENT_QUEUE_DEPTH);
    let (session, mut notifications) = Session::channel(id.clone(), "sse");

    let endpoint = format!("{}/message?sessionId={}", state.path, id);
    let _ = events_tx
        .send(Event::default().event("endpoint").data(endpoint))
        .await;

    state.sessions.insert(
        id.clone(),
        SseSession {
            session: Arc::new(session),
            events: events_tx.clone(),
        },
    );
    info!(session = %id, "SSE session opened");

    // Fan notifications out onto this session's stream until the client
    // disconnects or the binding shuts down.
    let forward_state = Arc::clone(&state);
    let forward_id = id.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                frame = notifications.recv() => frame,
                _ = forward_state.cancel.cancelled() => None,
            };
            let Some(frame) = frame else { break };
            let event = match serde_json::to_string(&frame) {
                Ok(data) => Event::default().event("message").data(data),
                Err(e) => {
                    error!("Failed to encode notification: {}", e);
                    continue;
                }
            };
            if events_tx.send(event).await.is_err() {
                break;
            }
        }
        forward_state.sessions.remove(&forward_id);
        debug!(session = %forward_id, "SSE session closed");
    });

    Sse::new(ReceiverStream::new(events_rx).map(Ok)).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: String,
}

/// `POST {path}/message?sessionId=`: decode and dispatch one request; the
/// response travels back over the session's event stream.
async fn post_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(entry) = state.sessions.get(&query.session_id) else {
        warn!(session = %query.session_id, "Message for unknown session");
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    let session = Arc::clone(&entry.session);
    let events = entry.events.clone();
    drop(entry);

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to parse message: {}", e);
            let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let response = state
        .dispatcher
        .dispatch(request, &session, state.cancel.child_token())
        .await;

    if let Some(response) = response {
        match serde_json::to_string(&response) {
            Ok(data) => {
                if events
                    .send(Event::default().event("message").data(data))
                    .await
                    .is_err()
                {
                    debug!(session = %session.id(), "Stream gone before response delivery");
                }
            }
            Err(e) => error!("Failed to encode response: {}", e),
        }
    }

    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hooks;
    use crate::protocol::types::ServerInfo;
    use crate::registry::CapabilityRegistry;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn binding(addr: &str) -> SseBinding {
        let dispatcher = Dispatcher::new(
            Arc::new(CapabilityRegistry::new()),
            Arc::new(Hooks::new()),
            ServerInfo {
                name: "test".into(),
                version: "0.0.1".into(),
            },
            None,
        );
        SseBinding::new(Arc::new(dispatcher), addr, "/sse")
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let binding = binding("127.0.0.1:0");
        assert!(binding.stop().await.is_ok());
        assert!(binding.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_start_binds_and_stop_drains() {
        let binding = binding("127.0.0.1:0");
        let cancel = CancellationToken::new();
        binding.start(cancel).await.unwrap();
        assert!(binding.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_opens_with_endpoint_event() {
        let binding = binding("127.0.0.1:0");
        let app = binding.router();

        let response = app
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut stream = response.into_body().into_data_stream();
        let chunk = stream.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();

        assert!(text.starts_with("event: endpoint\n"), "got: {}", text);
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let session_id = data.strip_prefix("/sse/message?sessionId=").unwrap();
        assert!(!session_id.is_empty());
        assert!(binding.state.sessions.contains_key(session_id));
    }

    #[tokio::test]
    async fn test_posted_request_answers_on_the_stream() {
        let binding = binding("127.0.0.1:0");

        let stream_response = binding
            .router()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut stream = stream_response.into_body().into_data_stream();
        let endpoint_chunk = stream.next().await.unwrap().unwrap();
        let endpoint_text = String::from_utf8(endpoint_chunk.to_vec()).unwrap();
        let endpoint = endpoint_text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap()
            .to_string();

        let body = json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" });
        let post_response = binding
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(&endpoint)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(post_response.status(), StatusCode::ACCEPTED);

        let chunk = stream.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event: message\n"), "got: {}", text);
        let frame: Value = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .unwrap();
        assert_eq!(frame["id"], 3);
        assert!(frame["result"].is_object());
    }

    #[tokio::test]
    async fn test_message_for_unknown_session_is_rejected() {
        let binding = binding("127.0.0.1:0");

        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
        let response = binding
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/sse/message?sessionId=nope")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_on_bad_addr_fails() {
        let binding = binding("256.0.0.1:99999");
        let err = binding.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::StartFailed { transport: "sse", .. }));
        // stop stays safe after a failed start
        assert!(binding.stop().await.is_ok());
    }
}
