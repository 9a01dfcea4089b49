//! Sessions and the per-session outbound notification channel.
//!
//! A session is the lifetime of one connection on one transport binding. It
//! owns exactly one [`NotificationSender`]; the transport side drains the
//! paired receiver onto the wire.

use crate::error::NotifyError;
use crate::protocol::types::{
    JsonRpcNotification, ProgressParams, ProgressToken, RequestId, PROGRESS_METHOD,
};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Default depth of a session's outbound queue.
const NOTIFICATION_QUEUE_DEPTH: usize = 64;

#[derive(Clone)]
enum Sink {
    /// Frames are forwarded to the transport's writer task.
    Channel(mpsc::Sender<JsonRpcNotification>),
    /// Frames are accepted and dropped (sessions with no notification path).
    Discard,
}

/// Outbound channel for asynchronous server-to-client notifications.
///
/// `send` completes once the transport has accepted the frame; it fails with
/// `SessionClosed` immediately when the connection is gone instead of
/// buffering indefinitely.
#[derive(Clone)]
pub struct NotificationSender {
    sink: Sink,
}

impl NotificationSender {
    fn channel(tx: mpsc::Sender<JsonRpcNotification>) -> Self {
        Self {
            sink: Sink::Channel(tx),
        }
    }

    fn discard() -> Self {
        Self { sink: Sink::Discard }
    }

    pub async fn send(&self, method: &str, params: Value) -> Result<(), NotifyError> {
        match &self.sink {
            Sink::Channel(tx) => {
                trace!(method, "Queueing notification");
                tx.send(JsonRpcNotification::new(method, params))
                    .await
                    .map_err(|_| NotifyError::SessionClosed)
            }
            Sink::Discard => Ok(()),
        }
    }

    /// Emit a `notifications/progress` frame carrying the caller's token.
    pub async fn progress(
        &self,
        token: ProgressToken,
        progress: u64,
        total: u64,
        message: impl Into<String>,
    ) -> Result<(), NotifyError> {
        let params = ProgressParams {
            progress,
            total,
            progress_token: token,
            message: Some(message.into()),
        };
        let params = serde_json::to_value(params)
            .map_err(|e| NotifyError::Transport(e.to_string().into()))?;
        self.send(PROGRESS_METHOD, params).await
    }
}

/// One client connection on one transport binding.
pub struct Session {
    id: String,
    transport: &'static str,
    notifications: NotificationSender,
}

impl Session {
    /// Create a session whose notifications are drained by the returned receiver.
    pub fn channel(
        id: impl Into<String>,
        transport: &'static str,
    ) -> (Self, mpsc::Receiver<JsonRpcNotification>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE_DEPTH);
        (
            Self {
                id: id.into(),
                transport,
                notifications: NotificationSender::channel(tx),
            },
            rx,
        )
    }

    /// Create a session with no notification path.
    pub fn detached(transport: &'static str) -> Self {
        Self {
            id: "detached".into(),
            transport,
            notifications: NotificationSender::discard(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &'static str {
        self.transport
    }

    pub fn notifications(&self) -> &NotificationSender {
        &self.notifications
    }
}

/// Per-request context handed to capability handlers.
pub struct RequestContext<'a> {
    session: &'a Session,
    pub request_id: Option<RequestId>,
    pub progress_token: Option<ProgressToken>,
    pub template_params: HashMap<String, String>,
    pub cancel: CancellationToken,
}

impl<'a> RequestContext<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            request_id: None,
            progress_token: None,
            template_params: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_request_id(mut self, id: Option<RequestId>) -> Self {
        self.request_id = id;
        self
    }

    pub fn with_progress_token(mut self, token: Option<ProgressToken>) -> Self {
        self.progress_token = token;
        self
    }

    pub fn with_template_params(mut self, params: HashMap<String, String>) -> Self {
        self.template_params = params;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn notifications(&self) -> &NotificationSender {
        self.session.notifications()
    }

    /// A placeholder binding extracted by resource template matching.
    pub fn template_param(&self, name: &str) -> Option<&str> {
        self.template_params.get(name).map(String::as_str)
    }
}
