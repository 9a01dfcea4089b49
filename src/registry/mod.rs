//! Capability registry: tools, resources, resource templates and prompts.
//!
//! Built once at startup, then shared read-only across every transport binding.

pub mod template;

use crate::error::{
    ProtocolResult, RegistryError, RegistryResult, ResourceError, ToolResult as ToolCallResult,
};
use crate::protocol::types::{
    CallToolResult, GetPromptResult, Prompt, Resource, ResourceContents, ResourceTemplate, Tool,
};
use crate::session::RequestContext;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use template::UriTemplate;
use tracing::debug;

/// Handler invoked for `tools/call`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &RequestContext, arguments: Value) -> ToolCallResult<CallToolResult>;
}

/// Handler invoked for `resources/read`.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(
        &self,
        ctx: &RequestContext,
        uri: &str,
    ) -> Result<Vec<ResourceContents>, ResourceError>;
}

/// Handler invoked for `prompts/get`.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, ctx: &RequestContext, arguments: Value) -> ProtocolResult<GetPromptResult>;
}

/// Successful resource resolution: the handler plus the template bindings
/// extracted from the URI (empty for exact static matches).
pub struct ResourceMatch {
    pub handler: Arc<dyn ResourceHandler>,
    pub params: HashMap<String, String>,
}

/// The capability registry.
///
/// Registration happens during startup through `&mut self`; afterwards the
/// registry is frozen in an `Arc` and only read. Listing methods iterate in
/// registration order, which is also the order templates are tried in.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Vec<(Tool, Arc<dyn ToolHandler>)>,
    tool_index: HashMap<String, usize>,
    resources: Vec<(Resource, Arc<dyn ResourceHandler>)>,
    resource_index: HashMap<String, usize>,
    templates: Vec<(ResourceTemplate, UriTemplate, Arc<dyn ResourceHandler>)>,
    prompts: Vec<(Prompt, Arc<dyn PromptHandler>)>,
    prompt_index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(
        &mut self,
        tool: Tool,
        handler: Arc<dyn ToolHandler>,
    ) -> RegistryResult<()> {
        if self.tool_index.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateCapability {
                kind: "tool",
                name: tool.name,
            });
        }
        debug!(name = %tool.name, "Registering tool");
        self.tool_index.insert(tool.name.clone(), self.tools.len());
        self.tools.push((tool, handler));
        Ok(())
    }

    pub fn register_resource(
        &mut self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
    ) -> RegistryResult<()> {
        if self.resource_index.contains_key(&resource.uri) {
            return Err(RegistryError::DuplicateCapability {
                kind: "resource",
                name: resource.uri,
            });
        }
        self.resource_index
            .insert(resource.uri.clone(), self.resources.len());
        self.resources.push((resource, handler));
        Ok(())
    }

    /// Templates may overlap; the first registered match wins at resolution.
    pub fn register_template(
        &mut self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) {
        debug!(template = %template.uri_template, "Registering resource template");
        let parsed = UriTemplate::parse(&template.uri_template);
        self.templates.push((template, parsed, handler));
    }

    pub fn register_prompt(
        &mut self,
        prompt: Prompt,
        handler: Arc<dyn PromptHandler>,
    ) -> RegistryResult<()> {
        if self.prompt_index.contains_key(&prompt.name) {
            return Err(RegistryError::DuplicateCapability {
                kind: "prompt",
                name: prompt.name,
            });
        }
        self.prompt_index
            .insert(prompt.name.clone(), self.prompts.len());
        self.prompts.push((prompt, handler));
        Ok(())
    }

    pub fn resolve_tool(&self, name: &str) -> RegistryResult<Arc<dyn ToolHandler>> {
        self.tool_index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i].1))
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))
    }

    /// Resolve a resource URI: exact static matches first, then templates in
    /// registration order.
    pub fn resolve_resource(&self, uri: &str) -> RegistryResult<ResourceMatch> {
        if let Some(&i) = self.resource_index.get(uri) {
            return Ok(ResourceMatch {
                handler: Arc::clone(&self.resources[i].1),
                params: HashMap::new(),
            });
        }

        for (_, template, handler) in &self.templates {
            if let Some(params) = template.matches(uri) {
                return Ok(ResourceMatch {
                    handler: Arc::clone(handler),
                    params,
                });
            }
        }

        Err(RegistryError::ResourceNotFound(uri.to_string()))
    }

    pub fn resolve_prompt(&self, name: &str) -> RegistryResult<Arc<dyn PromptHandler>> {
        self.prompt_index
            .get(name)
            .map(|&i| Arc::clone(&self.prompts[i].1))
            .ok_or_else(|| RegistryError::PromptNotFound(name.to_string()))
    }

    pub fn list_tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter().map(|(tool, _)| tool)
    }

    pub fn list_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().map(|(resource, _)| resource)
    }

    pub fn list_templates(&self) -> impl Iterator<Item = &ResourceTemplate> {
        self.templates.iter().map(|(template, _, _)| template)
    }

    pub fn list_prompts(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.iter().map(|(prompt, _)| prompt)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

/// Fluent builder for a tool definition with its advisory JSON schema.
///
/// The schema is metadata advertised to clients; handlers still validate the
/// arguments they bind.
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    properties: Map<String, Value>,
    required: Vec<Value>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn string_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, "string", description, required, |schema| schema)
    }

    pub fn string_enum_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        values: &[&str],
    ) -> Self {
        let values: Vec<Value> = values.iter().map(|v| Value::from(*v)).collect();
        self.param(name, "string", description, required, |mut schema| {
            schema.insert("enum".into(), Value::Array(values));
            schema
        })
    }

    pub fn string_pattern_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        pattern: &str,
    ) -> Self {
        let pattern = pattern.to_string();
        self.param(name, "string", description, required, move |mut schema| {
            schema.insert("pattern".into(), Value::from(pattern));
            schema
        })
    }

    pub fn number_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, "number", description, required, |schema| schema)
    }

    pub fn number_param_default(self, name: &str, description: &str, default: f64) -> Self {
        self.param(name, "number", description, false, move |mut schema| {
            schema.insert("default".into(), Value::from(default));
            schema
        })
    }

    fn param(
        mut self,
        name: &str,
        param_type: &str,
        description: &str,
        required: bool,
        extend: impl FnOnce(Map<String, Value>) -> Map<String, Value>,
    ) -> Self {
        let mut schema = Map::new();
        schema.insert("type".into(), Value::from(param_type));
        schema.insert("description".into(), Value::from(description));
        let schema = extend(schema);
        self.properties.insert(name.to_string(), Value::Object(schema));
        if required {
            self.required.push(Value::from(name));
        }
        self
    }

    pub fn build(self) -> Tool {
        let mut schema = Map::new();
        schema.insert("type".into(), Value::from("object"));
        schema.insert("properties".into(), Value::Object(self.properties));
        if !self.required.is_empty() {
            schema.insert("required".into(), Value::Array(self.required));
        }

        Tool {
            name: self.name,
            description: self.description,
            input_schema: Value::Object(schema),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolResult;
    use crate::session::Session;

    struct TestTool;

    #[async_trait]
    impl ToolHandler for TestTool {
        async fn call(
            &self,
            _ctx: &RequestContext,
            _arguments: Value,
        ) -> ToolResult<CallToolResult> {
            Ok(CallToolResult::text("test result"))
        }
    }

    struct TestResource;

    #[async_trait]
    impl ResourceHandler for TestResource {
        async fn read(
            &self,
            _ctx: &RequestContext,
            uri: &str,
        ) -> Result<Vec<ResourceContents>, ResourceError> {
            Ok(vec![ResourceContents::text(uri, "text/plain", "data")])
        }
    }

    fn tool(name: &str) -> Tool {
        ToolBuilder::new(name).description("a test tool").build()
    }

    #[test]
    fn test_register_and_resolve_tool() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(tool("test_tool"), Arc::new(TestTool))
            .unwrap();

        assert!(registry.resolve_tool("test_tool").is_ok());
        assert!(matches!(
            registry.resolve_tool("unknown"),
            Err(RegistryError::ToolNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(tool("echo"), Arc::new(TestTool))
            .unwrap();

        let err = registry
            .register_tool(tool("echo"), Arc::new(TestTool))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateCapability { .. }));
    }

    #[test]
    fn test_exact_resource_before_template() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_resource(
                Resource {
                    uri: "test://static/resource".into(),
                    name: "Static Resource".into(),
                    description: None,
                    mime_type: Some("text/plain".into()),
                },
                Arc::new(TestResource),
            )
            .unwrap();
        registry.register_template(
            ResourceTemplate {
                uri_template: "test://dynamic/resource/{id}".into(),
                name: "Dynamic Resource".into(),
                description: None,
                mime_type: None,
            },
            Arc::new(TestResource),
        );

        let exact = registry.resolve_resource("test://static/resource").unwrap();
        assert!(exact.params.is_empty());

        let templated = registry
            .resolve_resource("test://dynamic/resource/42")
            .unwrap();
        assert_eq!(templated.params.get("id").map(String::as_str), Some("42"));

        assert!(matches!(
            registry.resolve_resource("test://dynamic/other/42"),
            Err(RegistryError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_listing_preserves_registration_order() {
        let mut registry = CapabilityRegistry::new();
        for name in ["alpha", "beta", "gamma"] {
            registry.register_tool(tool(name), Arc::new(TestTool)).unwrap();
        }

        let names: Vec<&str> = registry.list_tools().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        // Restartable: a second listing yields the same sequence.
        let again: Vec<&str> = registry.list_tools().map(|t| t.name.as_str()).collect();
        assert_eq!(names, again);
    }

    #[tokio::test]
    async fn test_resolved_handler_is_invocable() {
        let mut registry = CapabilityRegistry::new();
        registry
            .register_tool(tool("test_tool"), Arc::new(TestTool))
            .unwrap();

        let handler = registry.resolve_tool("test_tool").unwrap();
        let session = Session::detached("test");
        let ctx = RequestContext::new(&session);
        let result = handler.call(&ctx, Value::Null).await.unwrap();
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn test_tool_builder_schema() {
        let tool = ToolBuilder::new("http_request")
            .description("Make HTTP requests to external APIs")
            .string_enum_param(
                "method",
                "HTTP method to use",
                true,
                &["GET", "POST", "PUT", "DELETE"],
            )
            .string_pattern_param("url", "URL to send the request to", true, "^https?://.*")
            .string_param("body", "Request body (for POST/PUT)", false)
            .build();

        let schema = tool.input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["method"]["enum"][0], "GET");
        assert_eq!(schema["properties"]["url"]["pattern"], "^https?://.*");
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
    }
}
