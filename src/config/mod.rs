//! Configuration types and builders.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// SSE binding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    pub addr: String,
    pub path: String,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8001".into(),
            path: "/sse".into(),
        }
    }
}

/// Streamable HTTP binding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub addr: String,
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8002".into(),
            path: "/mcp".into(),
        }
    }
}

/// Server configuration: identity plus transport toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub stdio: bool,
    pub sse: Option<SseConfig>,
    pub http: Option<HttpConfig>,
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            instructions: None,
            stdio: true,
            sse: Some(SseConfig::default()),
            http: Some(HttpConfig::default()),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Builder for ServerConfig with fluent API.
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                stdio: false,
                sse: None,
                http: None,
                ..ServerConfig::default()
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn stdio(mut self, enabled: bool) -> Self {
        self.config.stdio = enabled;
        self
    }

    pub fn sse(mut self, addr: impl Into<String>) -> Self {
        self.config.sse = Some(SseConfig {
            addr: addr.into(),
            ..SseConfig::default()
        });
        self
    }

    pub fn http(mut self, addr: impl Into<String>) -> Self {
        self.config.http = Some(HttpConfig {
            addr: addr.into(),
            ..HttpConfig::default()
        });
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Read transport toggles from the environment.
    ///
    /// `MCP_STDIO` (default on, "0"/"false" to disable), `MCP_SSE_ADDR` and
    /// `MCP_HTTP_ADDR` (unset disables the binding), `MCP_SSE_PATH`,
    /// `MCP_HTTP_PATH`, `MCP_SHUTDOWN_TIMEOUT_SECS`.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        self.config.stdio = match env::var("MCP_STDIO") {
            Ok(value) => !matches!(value.as_str(), "0" | "false" | "off"),
            Err(_) => true,
        };

        if let Ok(addr) = env::var("MCP_SSE_ADDR") {
            let path = env::var("MCP_SSE_PATH").unwrap_or_else(|_| "/sse".into());
            self.config.sse = Some(SseConfig { addr, path });
        }
        if let Ok(addr) = env::var("MCP_HTTP_ADDR") {
            let path = env::var("MCP_HTTP_PATH").unwrap_or_else(|_| "/mcp".into());
            self.config.http = Some(HttpConfig { addr, path });
        }

        if let Ok(secs) = env::var("MCP_SHUTDOWN_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "MCP_SHUTDOWN_TIMEOUT_SECS".into(),
                message: format!("not a number: '{}'", secs).into(),
            })?;
            self.config.shutdown_timeout = Duration::from_secs(secs);
        }

        Ok(self)
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enables_all_transports() {
        let config = ServerConfig::default();
        assert!(config.stdio);
        assert!(config.sse.is_some());
        assert!(config.http.is_some());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder_starts_with_no_transports() {
        let config = ServerConfig::builder().name("demo").build();
        assert_eq!(config.name, "demo");
        assert!(!config.stdio);
        assert!(config.sse.is_none());
        assert!(config.http.is_none());
    }

    #[test]
    fn test_builder_default_matches_new() {
        let config = ServerConfigBuilder::default().build();
        assert!(!config.stdio);
        assert!(config.sse.is_none());
        assert!(config.http.is_none());
    }

    #[test]
    fn test_builder_toggles() {
        let config = ServerConfig::builder()
            .stdio(true)
            .sse("127.0.0.1:9001")
            .http("127.0.0.1:9002")
            .shutdown_timeout(Duration::from_secs(2))
            .build();

        assert!(config.stdio);
        assert_eq!(config.sse.unwrap().addr, "127.0.0.1:9001");
        assert_eq!(config.http.unwrap().path, "/mcp");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }
}
