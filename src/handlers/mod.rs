//! Built-in capability set: the tools, resources and prompts this server
//! exposes out of the box.

pub mod prompts;
pub mod resources;
pub mod tools;

use crate::error::RegistryResult;
use crate::protocol::types::{Prompt, PromptArgument};
use crate::registry::{CapabilityRegistry, ToolBuilder};
use std::sync::Arc;

pub use resources::{register_resources, resource_is_text};

/// Base64 of a 1x1 transparent PNG, served by `getTinyImage` and the
/// complex prompt.
pub const TINY_IMAGE_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

/// Register every built-in tool, resource and prompt.
pub fn register_all(registry: &mut CapabilityRegistry) -> RegistryResult<()> {
    register_tools(registry)?;
    register_resources(registry)?;
    register_prompts(registry)?;
    Ok(())
}

fn register_tools(registry: &mut CapabilityRegistry) -> RegistryResult<()> {
    registry.register_tool(
        ToolBuilder::new("echo")
            .description("Echoes back the input")
            .string_param("message", "Message to echo", true)
            .build(),
        Arc::new(tools::EchoTool),
    )?;

    registry.register_tool(
        ToolBuilder::new("add")
            .description("Adds two numbers")
            .number_param("a", "First number", true)
            .number_param("b", "Second number", true)
            .build(),
        Arc::new(tools::AddTool),
    )?;

    registry.register_tool(
        ToolBuilder::new("http_request")
            .description("Makes HTTP requests to external APIs")
            .string_enum_param(
                "method",
                "HTTP method to use",
                true,
                &["GET", "POST", "PUT", "DELETE"],
            )
            .string_pattern_param("url", "URL to send the request to", true, "^https?://.*")
            .string_param("body", "Request body (for POST/PUT)", false)
            .build(),
        Arc::new(tools::HttpRequestTool::new()),
    )?;

    registry.register_tool(
        ToolBuilder::new("longRunningOperation")
            .description(
                "Demonstrates a long running operation with progress updates",
            )
            .number_param_default("duration", "Duration of the operation in seconds", 10.0)
            .number_param_default("steps", "Number of steps in the operation", 5.0)
            .build(),
        Arc::new(tools::LongRunningOperationTool),
    )?;

    registry.register_tool(
        ToolBuilder::new("notify")
            .description("Sends a notification to the client")
            .build(),
        Arc::new(tools::NotifyTool),
    )?;

    registry.register_tool(
        ToolBuilder::new("sampleLLM")
            .description("Samples from an LLM using MCP's sampling feature")
            .string_param("prompt", "The prompt to send to the LLM", true)
            .number_param_default("maxTokens", "Maximum number of tokens to generate", 100.0)
            .build(),
        Arc::new(tools::SampleLlmTool),
    )?;

    registry.register_tool(
        ToolBuilder::new("getTinyImage")
            .description("Returns the MCP_TINY_IMAGE")
            .build(),
        Arc::new(tools::GetTinyImageTool),
    )?;

    Ok(())
}

fn register_prompts(registry: &mut CapabilityRegistry) -> RegistryResult<()> {
    registry.register_prompt(
        Prompt {
            name: "simple_prompt".into(),
            description: Some("A simple prompt without arguments".into()),
            arguments: None,
        },
        Arc::new(prompts::SimplePrompt),
    )?;

    registry.register_prompt(
        Prompt {
            name: "complex_prompt".into(),
            description: Some("A complex prompt with arguments".into()),
            arguments: Some(vec![
                PromptArgument {
                    name: "temperature".into(),
                    description: Some("The temperature parameter for generation".into()),
                    required: Some(true),
                },
                PromptArgument {
                    name: "style".into(),
                    description: Some("The style to use for the response".into()),
                    required: Some(true),
                },
            ]),
        },
        Arc::new(prompts::ComplexPrompt),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_counts() {
        let mut registry = CapabilityRegistry::default();
        register_all(&mut registry).unwrap();

        assert_eq!(registry.tool_count(), 7);
        assert_eq!(registry.list_resources().count(), 101);
        assert_eq!(registry.list_templates().count(), 1);
        assert_eq!(registry.list_prompts().count(), 2);
    }

    #[test]
    fn test_register_all_is_not_reentrant() {
        let mut registry = CapabilityRegistry::default();
        register_all(&mut registry).unwrap();
        assert!(register_all(&mut registry).is_err());
    }

    #[test]
    fn test_tool_order_is_stable() {
        let mut registry = CapabilityRegistry::default();
        register_all(&mut registry).unwrap();
        let names: Vec<_> = registry.list_tools().map(|t| t.name.as_str()).collect();
        assert_eq!(names[0], "echo");
        assert_eq!(names[3], "longRunningOperation");
    }
}
