//! Line-oriented stdio transport binding.
//!
//! One JSON-RPC message per line on stdin, responses and notifications written
//! one per line to stdout. The whole process is a single session; stdout is
//! owned by a dedicated writer task so responses and notifications never
//! interleave mid-line.

use crate::error::ServerError;
use crate::protocol::types::{JsonRpcError, JsonRpcResponse, Message};
use crate::protocol::Dispatcher;
use crate::session::Session;
use crate::transport::TransportBinding;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Transport binding bound to the process's standard streams.
pub struct StdioBinding {
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioBinding {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportBinding for StdioBinding {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn start(&self, cancel: CancellationToken) -> Result<(), ServerError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            // One token for the whole session, cancelled when either the
            // coordinator or this binding shuts down. In-flight handlers see
            // it through their per-request child tokens.
            let session_cancel = CancellationToken::new();
            let linker = {
                let session_cancel = session_cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = shutdown.cancelled() => {}
                    }
                    session_cancel.cancel();
                })
            };

            let reader = BufReader::new(tokio::io::stdin());
            let (out_tx, out_rx) = mpsc::channel::<String>(64);
            let writer = tokio::spawn(write_loop(out_rx));

            run_session(dispatcher, reader, out_tx, session_cancel).await;

            linker.abort();
            let _ = writer.await;
            debug!("stdio session ended");
        });

        *self.task.lock() = Some(handle);
        info!("stdio transport attached");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                return Err(ServerError::StopFailed {
                    transport: "stdio",
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Read requests line by line until EOF or cancellation, dispatching each in
/// arrival order. A handler that is mid-flight when `cancel` fires observes it
/// through its child token and still gets its response written.
async fn run_session<R: AsyncBufRead + Unpin>(
    dispatcher: Arc<Dispatcher>,
    mut reader: R,
    out_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let (session, mut notifications) = Session::channel("stdio", "stdio");
    let notify_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(frame) = notifications.recv().await {
            match serde_json::to_string(&frame) {
                Ok(line) => {
                    if notify_out.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to encode notification: {}", e),
            }
        }
    });

    let mut line = String::new();

    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read,
            _ = cancel.cancelled() => {
                debug!("shutdown requested, ending stdio session");
                break;
            }
        };
        match read {
            Ok(0) => {
                debug!("EOF received, ending stdio session");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error reading from stdin: {}", e);
                break;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        trace!("Received line: {}", trimmed);

        let message = match serde_json::from_str::<Message>(trimmed) {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to parse message: {}", e);
                let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                send_response(&out_tx, &response).await;
                continue;
            }
        };

        match message {
            Message::Request(request) => {
                if let Some(response) = dispatcher
                    .dispatch(request, &session, cancel.child_token())
                    .await
                {
                    send_response(&out_tx, &response).await;
                }
            }
            Message::Response(response) => {
                // We don't expect responses in server mode, but log them.
                warn!("Unexpected response received: {:?}", response.id);
            }
        }
    }

    cancel.cancel();
    drop(session);
    drop(out_tx);
    let _ = forwarder.await;
}

async fn send_response(out: &mpsc::Sender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            debug!("Sending response: id={:?}", response.id);
            if out.send(line).await.is_err() {
                error!("stdout writer gone, dropping response");
            }
        }
        Err(e) => error!("Failed to encode response: {}", e),
    }
}

/// Sole owner of stdout; drains queued frames one line at a time.
async fn write_loop(mut rx: mpsc::Receiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(frame) = rx.recv().await {
        trace!("Sending line: {}", frame);
        if stdout.write_all(frame.as_bytes()).await.is_err()
            || stdout.write_all(b"\n").await.is_err()
            || stdout.flush().await.is_err()
        {
            error!("Failed to write to stdout");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use crate::hooks::Hooks;
    use crate::protocol::types::{CallToolResult, RequestId, ServerInfo};
    use crate::registry::{CapabilityRegistry, ToolBuilder, ToolHandler};
    use crate::session::RequestContext;
    use serde_json::Value;
    use std::time::Duration;

    fn binding() -> StdioBinding {
        let dispatcher = Dispatcher::new(
            Arc::new(CapabilityRegistry::new()),
            Arc::new(Hooks::new()),
            ServerInfo {
                name: "test".into(),
                version: "0.0.1".into(),
            },
            None,
        );
        StdioBinding::new(Arc::new(dispatcher))
    }

    #[test]
    fn test_request_parsing() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
        let message: Message = serde_json::from_str(json).unwrap();
        match message {
            Message::Request(request) => {
                assert_eq!(request.method, "initialize");
                assert_eq!(request.id, Some(RequestId::Number(1)));
            }
            Message::Response(_) => panic!("parsed as response"),
        }
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let binding = binding();
        assert!(binding.stop().await.is_ok());
        // Idempotent.
        assert!(binding.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_start_returns_immediately_and_stop_joins() {
        let binding = binding();
        let cancel = CancellationToken::new();
        binding.start(cancel.clone()).await.unwrap();
        assert!(binding.stop().await.is_ok());
    }

    struct WaitForShutdownTool;

    #[async_trait]
    impl ToolHandler for WaitForShutdownTool {
        async fn call(
            &self,
            ctx: &RequestContext,
            _arguments: Value,
        ) -> ToolResult<CallToolResult> {
            ctx.cancel.cancelled().await;
            Ok(CallToolResult::text("stopped by shutdown"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_handler_observes_session_cancellation() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(
                ToolBuilder::new("wait")
                    .description("Blocks until the session shuts down")
                    .build(),
                Arc::new(WaitForShutdownTool),
            )
            .unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            Arc::new(Hooks::new()),
            ServerInfo {
                name: "test".into(),
                version: "0.0.1".into(),
            },
            None,
        ));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"wait","arguments":{}}}"#,
            "\n",
        );
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run_session(
            dispatcher,
            input.as_bytes(),
            out_tx,
            cancel.clone(),
        ));

        // Let the handler get in flight, then shut the session down.
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        session.await.unwrap();

        let line = out_rx.recv().await.expect("response line");
        assert!(line.contains(r#""id":7"#));
        assert!(line.contains("stopped by shutdown"));
    }
}
