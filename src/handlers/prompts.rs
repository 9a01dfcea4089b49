//! Built-in prompt handlers.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::types::{Content, GetPromptResult, PromptMessage, Role};
use crate::registry::PromptHandler;
use crate::session::RequestContext;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::TINY_IMAGE_PNG;

/// Prompt with no arguments.
pub struct SimplePrompt;

#[async_trait]
impl PromptHandler for SimplePrompt {
    async fn get(&self, _ctx: &RequestContext, _arguments: Value) -> ProtocolResult<GetPromptResult> {
        Ok(GetPromptResult {
            description: Some("A simple prompt without arguments".into()),
            messages: vec![PromptMessage::user_text(
                "This is a simple prompt without arguments.",
            )],
        })
    }
}

/// Prompt that requires `temperature` and `style` and mixes text with image content.
pub struct ComplexPrompt;

#[derive(Deserialize)]
struct ComplexPromptArgs {
    temperature: String,
    style: String,
}

#[async_trait]
impl PromptHandler for ComplexPrompt {
    async fn get(&self, _ctx: &RequestContext, arguments: Value) -> ProtocolResult<GetPromptResult> {
        let args: ComplexPromptArgs = serde_json::from_value(arguments)
            .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?;

        Ok(GetPromptResult {
            description: Some("A complex prompt with arguments".into()),
            messages: vec![
                PromptMessage::user_text(format!(
                    "This is a complex prompt with arguments: temperature={}, style={}",
                    args.temperature, args.style
                )),
                PromptMessage::assistant_text(
                    "I understand. You've provided a complex prompt with temperature and style arguments. How would you like me to proceed?",
                ),
                PromptMessage {
                    role: Role::User,
                    content: Content::Image {
                        data: TINY_IMAGE_PNG.into(),
                        mime_type: "image/png".into(),
                    },
                },
            ],
        })
    }
}
