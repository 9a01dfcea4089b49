//! Method dispatcher: hooks, registry resolution, structured responses.
//!
//! Every transport binding decodes its framing into [`JsonRpcRequest`] and
//! funnels it through here; per-request failures become JSON-RPC error
//! responses and never escape to the binding's accept loop.

use crate::error::{ProtocolError, ProtocolResult, RegistryError, ToolError};
use crate::hooks::{HookEvent, Hooks};
use crate::protocol::types::*;
use crate::registry::CapabilityRegistry;
use crate::session::{RequestContext, Session};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Routes decoded requests to registry handlers through the hook pipeline.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    hooks: Arc<Hooks>,
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        hooks: Arc<Hooks>,
        server_info: ServerInfo,
        instructions: Option<String>,
    ) -> Self {
        let capabilities = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            prompts: Some(PromptsCapability {
                list_changed: Some(false),
            }),
            logging: Some(LoggingCapability {}),
        };

        Self {
            registry,
            hooks,
            server_info,
            capabilities,
            instructions,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Dispatch one request on behalf of a session.
    ///
    /// Returns `None` for notifications (no id), which are never answered.
    #[instrument(skip_all, fields(method = %request.method, session = %session.id()))]
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        session: &Session,
        cancel: CancellationToken,
    ) -> Option<JsonRpcResponse> {
        debug!("Dispatching request");

        let event = HookEvent {
            request_id: request.id.clone(),
            method: request.method.clone(),
            params: request.params.clone(),
        };
        self.hooks.run_before_any(&event);

        let progress_token = request.progress_token();
        let is_notification = request.is_notification();

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(&event, request.params).await,
            "notifications/initialized" | "initialized" => {
                info!("Client initialization complete");
                Ok(Value::Null)
            }
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => {
                self.handle_call_tool(&event, request.params, session, progress_token, cancel)
                    .await
            }
            "resources/list" => self.handle_list_resources(),
            "resources/templates/list" => self.handle_list_templates(),
            "resources/read" => {
                self.handle_read_resource(request.params, session, cancel)
                    .await
            }
            "prompts/list" => self.handle_list_prompts(),
            "prompts/get" => self.handle_get_prompt(request.params, session).await,
            method => {
                warn!("Unknown method: {}", method);
                Err(ProtocolError::MethodNotFound(method.to_string()))
            }
        };

        if is_notification {
            if let Err(e) = result {
                debug!("Notification handling failed: {}", e);
            }
            return None;
        }

        Some(match result {
            Ok(value) => {
                self.hooks.run_on_success(&event, &value);
                JsonRpcResponse::success(request.id, value)
            }
            Err(e) => {
                error!("Request failed: {}", e);
                let rpc_error = JsonRpcError::new(e.code(), e.to_string());
                self.hooks.run_on_error(&event, &rpc_error);
                JsonRpcResponse::error(request.id, rpc_error)
            }
        })
    }

    async fn handle_initialize(
        &self,
        event: &HookEvent,
        params: Option<Value>,
    ) -> ProtocolResult<Value> {
        let params: InitializeParams = bind_params(params)?;

        // The one veto point: a rejection here keeps the connection from
        // being promoted to an active session.
        self.hooks
            .run_on_request_initialization(event)
            .map_err(|veto| ProtocolError::Vetoed(veto.reason))?;

        self.hooks.run_before_initialize(event);

        info!(
            "Initialize request from {} v{}",
            params.client_info.name, params.client_info.version
        );

        let result = InitializeResult {
            protocol_version: MCP_VERSION.into(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: self.instructions.clone(),
        };

        self.hooks.run_after_initialize(event, &result);
        to_result_value(result)
    }

    fn handle_list_tools(&self) -> ProtocolResult<Value> {
        let tools: Vec<Tool> = self.registry.list_tools().cloned().collect();
        debug!("Listing {} tools", tools.len());
        to_result_value(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn handle_call_tool(
        &self,
        event: &HookEvent,
        params: Option<Value>,
        session: &Session,
        progress_token: Option<ProgressToken>,
        cancel: CancellationToken,
    ) -> ProtocolResult<Value> {
        let params: CallToolParams = bind_params(params)?;
        self.hooks.run_before_call_tool(event, &params);

        let handler = self
            .registry
            .resolve_tool(&params.name)
            .map_err(registry_error)?;

        let ctx = RequestContext::new(session)
            .with_request_id(event.request_id.clone())
            .with_progress_token(progress_token)
            .with_cancel(cancel);

        let result = match handler.call(&ctx, params.arguments.clone()).await {
            Ok(result) => result,
            Err(ToolError::InvalidArguments(msg)) => {
                CallToolResult::error(format!("Invalid arguments: {}", msg))
            }
            Err(ToolError::MissingArgument(name)) => {
                CallToolResult::error(format!("Missing required argument: {}", name))
            }
            Err(e) => {
                error!("Tool '{}' failed: {}", params.name, e);
                CallToolResult::error(e.to_string())
            }
        };

        self.hooks.run_after_call_tool(event, &params, &result);
        to_result_value(result)
    }

    fn handle_list_resources(&self) -> ProtocolResult<Value> {
        let resources: Vec<Resource> = self.registry.list_resources().cloned().collect();
        debug!("Listing {} resources", resources.len());
        to_result_value(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    fn handle_list_templates(&self) -> ProtocolResult<Value> {
        let resource_templates: Vec<ResourceTemplate> =
            self.registry.list_templates().cloned().collect();
        to_result_value(ListResourceTemplatesResult { resource_templates })
    }

    async fn handle_read_resource(
        &self,
        params: Option<Value>,
        session: &Session,
        cancel: CancellationToken,
    ) -> ProtocolResult<Value> {
        let params: ReadResourceParams = bind_params(params)?;

        let matched = self
            .registry
            .resolve_resource(&params.uri)
            .map_err(registry_error)?;

        let ctx = RequestContext::new(session)
            .with_template_params(matched.params)
            .with_cancel(cancel);

        let contents = matched
            .handler
            .read(&ctx, &params.uri)
            .await
            .map_err(|e| ProtocolError::InternalError(e.to_string().into()))?;

        to_result_value(ReadResourceResult { contents })
    }

    fn handle_list_prompts(&self) -> ProtocolResult<Value> {
        let prompts: Vec<Prompt> = self.registry.list_prompts().cloned().collect();
        to_result_value(ListPromptsResult {
            prompts,
            next_cursor: None,
        })
    }

    async fn handle_get_prompt(
        &self,
        params: Option<Value>,
        session: &Session,
    ) -> ProtocolResult<Value> {
        let params: GetPromptParams = bind_params(params)?;

        let handler = self
            .registry
            .resolve_prompt(&params.name)
            .map_err(registry_error)?;

        let ctx = RequestContext::new(session);
        let result = handler.get(&ctx, params.arguments).await?;
        to_result_value(result)
    }
}

fn bind_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> ProtocolResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| ProtocolError::InvalidParams(e.to_string().into()))?
        .ok_or_else(|| ProtocolError::InvalidParams("Missing params".into()))
}

fn to_result_value<T: serde::Serialize>(result: T) -> ProtocolResult<Value> {
    serde_json::to_value(result).map_err(|e| ProtocolError::InternalError(e.to_string().into()))
}

fn registry_error(e: RegistryError) -> ProtocolError {
    ProtocolError::InvalidParams(e.to_string().into())
}
