//! MCP server binary entry point.

use anyhow::Result;
use everything_mcp::{
    config::ServerConfig,
    handlers,
    hooks::Hooks,
    protocol::types::ServerInfo,
    registry::CapabilityRegistry,
    server::McpServerBuilder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config = ServerConfig::builder().from_env()?.build();

    let mut registry = CapabilityRegistry::default();
    handlers::register_all(&mut registry).map_err(|e| anyhow::anyhow!(e))?;
    info!(
        "Registered {} tools, {} resources, {} prompts",
        registry.tool_count(),
        registry.list_resources().count(),
        registry.list_prompts().count()
    );

    let server = McpServerBuilder::new()
        .dispatcher(
            Arc::new(registry),
            Arc::new(logging_hooks()),
            ServerInfo {
                name: config.name.clone(),
                version: config.version.clone(),
            },
            config.instructions.clone(),
        )
        .from_config(&config)
        .build()?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    info!("MCP server ready, waiting for connections...");

    server.run(cancel).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Hooks that trace every stage of request handling.
fn logging_hooks() -> Hooks {
    let mut hooks = Hooks::default();

    hooks.add_before_any(|event| {
        debug!(method = %event.method, id = ?event.request_id, "Handling request");
    });
    hooks.add_on_success(|event, _result| {
        debug!(method = %event.method, id = ?event.request_id, "Request succeeded");
    });
    hooks.add_on_error(|event, err| {
        warn!(method = %event.method, code = err.code, message = %err.message, "Request failed");
    });
    hooks.add_before_initialize(|event| {
        debug!(id = ?event.request_id, "Initializing session");
    });
    hooks.add_after_initialize(|_event, result| {
        info!(
            client_protocol = %result.protocol_version,
            "Session initialized"
        );
    });
    hooks.add_on_request_initialization(|event| {
        debug!(id = ?event.request_id, "Validating initialization request");
        Ok(())
    });
    hooks.add_before_call_tool(|_event, params| {
        info!(tool = %params.name, "Calling tool");
    });
    hooks.add_after_call_tool(|_event, params, result| {
        info!(
            tool = %params.name,
            is_error = result.is_error.unwrap_or(false),
            "Tool call finished"
        );
    });

    hooks
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("everything_mcp=info,warn"));

    // JSON-formatted logs go to stderr; stdout carries protocol frames.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .json()
        .init();
}
