//! Built-in tool handlers.

use crate::error::{ToolError, ToolResult};
use crate::protocol::types::{CallToolResult, Content, PROGRESS_METHOD};
use crate::registry::ToolHandler;
use crate::session::RequestContext;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::TINY_IMAGE_PNG;

fn bind_args<T: serde::de::DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Echoes back the input.
pub struct EchoTool;

#[derive(Deserialize)]
struct EchoArgs {
    message: String,
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, _ctx: &RequestContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: EchoArgs = bind_args(arguments)?;
        Ok(CallToolResult::text(format!("Echo: {}", args.message)))
    }
}

/// Adds two numbers.
pub struct AddTool;

#[derive(Deserialize)]
struct AddArgs {
    a: f64,
    b: f64,
}

#[async_trait]
impl ToolHandler for AddTool {
    async fn call(&self, _ctx: &RequestContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: AddArgs = bind_args(arguments)?;
        let sum = args.a + args.b;
        Ok(CallToolResult::text(format!(
            "The sum of {} and {} is {}.",
            args.a, args.b, sum
        )))
    }
}

const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Makes HTTP requests to external APIs.
pub struct HttpRequestTool {
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct HttpRequestArgs {
    method: String,
    url: String,
    #[serde(default)]
    body: String,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for HttpRequestTool {
    async fn call(&self, _ctx: &RequestContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: HttpRequestArgs = bind_args(arguments)?;

        if !ALLOWED_METHODS.contains(&args.method.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "method must be one of {:?}",
                ALLOWED_METHODS
            )));
        }
        if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "url must start with http:// or https://".into(),
            ));
        }

        let method = reqwest::Method::from_bytes(args.method.as_bytes())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let mut request = self.client.request(method, &args.url);
        if !args.body.is_empty() {
            request = request.body(args.body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(CallToolResult::error(format!(
                    "unable to execute request: {}",
                    e
                )))
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Ok(CallToolResult::error(format!(
                    "unable to read request response: {}",
                    e
                )))
            }
        };

        Ok(CallToolResult::text(format!(
            "Status: {}\nBody: {}",
            status, body
        )))
    }
}

/// Demonstrates a long running operation with progress updates.
pub struct LongRunningOperationTool;

#[derive(Deserialize)]
struct LongRunningArgs {
    #[serde(default = "default_duration")]
    duration: f64,
    #[serde(default = "default_steps")]
    steps: f64,
}

fn default_duration() -> f64 {
    10.0
}

fn default_steps() -> f64 {
    5.0
}

#[async_trait]
impl ToolHandler for LongRunningOperationTool {
    async fn call(&self, ctx: &RequestContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: LongRunningArgs = bind_args(arguments)?;
        let steps = args.steps as u64;

        let completed = format!(
            "Long running operation completed. Duration: {} seconds, Steps: {}.",
            args.duration, steps
        );

        // Guard the pacing computation: zero steps or a non-positive interval
        // means the operation finishes without emitting anything.
        if steps == 0 {
            return Ok(CallToolResult::text(completed));
        }
        let interval = args.duration / steps as f64;
        if !(interval > 0.0) || !interval.is_finite() {
            return Ok(CallToolResult::text(completed));
        }
        let interval = Duration::from_secs_f64(interval);

        for i in 1..=steps {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = ctx.cancel.cancelled() => {
                    debug!("Long running operation cancelled at step {}/{}", i, steps);
                    return Ok(CallToolResult::text(format!(
                        "Long running operation cancelled after {} of {} steps.",
                        i - 1,
                        steps
                    )));
                }
            }

            // No correlation token means the caller asked for no updates.
            if let Some(token) = &ctx.progress_token {
                ctx.notifications()
                    .progress(
                        token.clone(),
                        i,
                        steps,
                        format!("Server progress {}%", i * 100 / steps),
                    )
                    .await?;
            }
        }

        Ok(CallToolResult::text(completed))
    }
}

/// Sends a single progress notification to the calling session.
pub struct NotifyTool;

#[async_trait]
impl ToolHandler for NotifyTool {
    async fn call(&self, ctx: &RequestContext, _arguments: Value) -> ToolResult<CallToolResult> {
        ctx.notifications()
            .send(
                PROGRESS_METHOD,
                serde_json::json!({
                    "progress": 10,
                    "total": 10,
                    "progressToken": 0,
                }),
            )
            .await?;
        Ok(CallToolResult::text("notification sent successfully"))
    }
}

/// Samples from an LLM (mock implementation).
pub struct SampleLlmTool;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SampleLlmArgs {
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_max_tokens")]
    max_tokens: f64,
}

fn default_max_tokens() -> f64 {
    100.0
}

#[async_trait]
impl ToolHandler for SampleLlmTool {
    async fn call(&self, _ctx: &RequestContext, arguments: Value) -> ToolResult<CallToolResult> {
        let args: SampleLlmArgs = bind_args(arguments)?;
        let result = format!(
            "Sample LLM result for prompt: '{}' (max tokens: {})",
            args.prompt, args.max_tokens as u64
        );
        Ok(CallToolResult::text(format!(
            "LLM sampling result: {}",
            result
        )))
    }
}

/// Returns the bundled tiny PNG.
pub struct GetTinyImageTool;

#[async_trait]
impl ToolHandler for GetTinyImageTool {
    async fn call(&self, _ctx: &RequestContext, _arguments: Value) -> ToolResult<CallToolResult> {
        Ok(CallToolResult {
            content: vec![
                Content::Text {
                    text: "This is a tiny image:".into(),
                },
                Content::Image {
                    data: TINY_IMAGE_PNG.into(),
                    mime_type: "image/png".into(),
                },
                Content::Text {
                    text: "The image above is the MCP tiny image.".into(),
                },
            ],
            is_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{JsonRpcNotification, ProgressToken};
    use crate::session::Session;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_echo() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let result = EchoTool
            .call(&ctx, serde_json::json!({"message": "hello"}))
            .await
            .unwrap();
        match &result.content[0] {
            Content::Text { text } => assert_eq!(text, "Echo: hello"),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_echo_missing_argument() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let err = EchoTool.call(&ctx, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_add() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let result = AddTool
            .call(&ctx, serde_json::json!({"a": 1.5, "b": 2.0}))
            .await
            .unwrap();
        match &result.content[0] {
            Content::Text { text } => assert_eq!(text, "The sum of 1.5 and 2 is 3.5."),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_request_rejects_bad_method() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let err = HttpRequestTool::new()
            .call(
                &ctx,
                serde_json::json!({"method": "TRACE", "url": "https://example.com"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_http_request_rejects_bad_scheme() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let err = HttpRequestTool::new()
            .call(
                &ctx,
                serde_json::json!({"method": "GET", "url": "ftp://example.com"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    async fn run_long_running(
        duration: f64,
        steps: f64,
        token: Option<ProgressToken>,
    ) -> (CallToolResult, Vec<JsonRpcNotification>) {
        let (session, rx) = Session::channel("test", "test");
        let ctx = RequestContext::new(&session).with_progress_token(token);
        let result = LongRunningOperationTool
            .call(
                &ctx,
                serde_json::json!({"duration": duration, "steps": steps}),
            )
            .await
            .unwrap();
        drop(session);
        (result, drain(rx).await)
    }

    async fn drain(mut rx: mpsc::Receiver<JsonRpcNotification>) -> Vec<JsonRpcNotification> {
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_emits_one_notification_per_step() {
        let (result, frames) =
            run_long_running(10.0, 5.0, Some(ProgressToken::String("op-1".into()))).await;

        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.method, PROGRESS_METHOD);
            let params = frame.params.as_ref().unwrap();
            assert_eq!(params["progress"], (i + 1) as u64);
            assert_eq!(params["total"], 5);
            assert_eq!(params["progressToken"], "op-1");
            assert_eq!(
                params["message"],
                format!("Server progress {}%", (i + 1) * 20)
            );
        }
        match &result.content[0] {
            Content::Text { text } => assert!(text.starts_with("Long running operation completed")),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_without_token_is_silent() {
        let (_, frames) = run_long_running(10.0, 5.0, None).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_long_running_zero_steps() {
        let (result, frames) =
            run_long_running(10.0, 0.0, Some(ProgressToken::Number(1))).await;
        assert!(frames.is_empty());
        assert!(result.is_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_aborts_on_closed_session() {
        let (session, rx) = Session::channel("test", "test");
        drop(rx);
        let ctx = RequestContext::new(&session)
            .with_progress_token(Some(ProgressToken::Number(7)));

        let err = LongRunningOperationTool
            .call(&ctx, serde_json::json!({"duration": 10, "steps": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Notify(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_running_cancellation_returns_promptly() {
        let (session, rx) = Session::channel("test", "test");
        let ctx = RequestContext::new(&session)
            .with_progress_token(Some(ProgressToken::Number(7)));
        ctx.cancel.cancel();

        let result = LongRunningOperationTool
            .call(&ctx, serde_json::json!({"duration": 10, "steps": 5}))
            .await
            .unwrap();
        drop(session);
        assert!(drain(rx).await.is_empty());
        match &result.content[0] {
            Content::Text { text } => assert!(text.contains("cancelled")),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notify_tool() {
        let (session, mut rx) = Session::channel("test", "test");
        let ctx = RequestContext::new(&session);
        NotifyTool.call(&ctx, Value::Null).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.method, PROGRESS_METHOD);
        assert_eq!(frame.params.unwrap()["progressToken"], 0);
    }

    #[tokio::test]
    async fn test_sample_llm_defaults() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let result = SampleLlmTool
            .call(&ctx, serde_json::json!({"prompt": "hi"}))
            .await
            .unwrap();
        match &result.content[0] {
            Content::Text { text } => assert!(text.contains("max tokens: 100")),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tiny_image_content_order() {
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let result = GetTinyImageTool.call(&ctx, Value::Null).await.unwrap();
        assert_eq!(result.content.len(), 3);
        assert!(matches!(result.content[1], Content::Image { .. }));
    }
}
