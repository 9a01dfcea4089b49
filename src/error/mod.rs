//! Error types for the MCP server.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` conversions.

use std::borrow::Cow;
use thiserror::Error;

/// Main error type for the multi-transport MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: Cow<'static, str> },
}

/// JSON-RPC 2.0 and MCP protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: invalid JSON")]
    ParseError,

    #[error("Invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(Cow<'static, str>),

    #[error("Internal error: {0}")]
    InternalError(Cow<'static, str>),

    #[error("Initialization rejected: {0}")]
    Vetoed(Cow<'static, str>),

    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),
}

impl ProtocolError {
    /// Returns the JSON-RPC 2.0 error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::InternalError(_) => -32603,
            Self::Vetoed(_) => -32002,
            Self::Transport(_) => -32000,
        }
    }
}

/// Capability registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Duplicate capability: {kind} '{name}' is already registered")]
    DuplicateCapability { kind: &'static str, name: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),
}

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Session closed")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),
}

/// Lifecycle coordinator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerError {
    #[error("No transport configured")]
    NoTransportConfigured,

    #[error("Transport '{transport}' failed to start: {message}")]
    StartFailed {
        transport: &'static str,
        message: String,
    },

    #[error("Transport '{transport}' failed to stop: {message}")]
    StopFailed {
        transport: &'static str,
        message: String,
    },

    #[error("Transport '{transport}' did not stop within the shutdown timeout")]
    ShutdownTimeout { transport: &'static str },
}

/// Tool argument and execution errors.
///
/// These surface as tool-result errors (`isError: true`), not transport faults.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(Cow<'static, str>),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Resource read errors.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Invalid resource URI: {0}")]
    InvalidUri(String),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: Cow<'static, str>,
        message: Cow<'static, str>,
    },
}

/// Result type alias for McpError.
pub type Result<T> = std::result::Result<T, McpError>;

/// Result type alias for ProtocolError.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for RegistryError.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type alias for ToolError.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
