//! Server and session configuration.
//!
//! Shaped like the teacher's `plugins/cors.rs` `Config`/`*Builder` pair; loadable from
//! the environment via `envy`, the ambient-config crate this corpus declares for it.

use std::time::Duration;

use serde::Deserialize;

/// Raw environment-variable shape consumed by `envy`. Prefix with `APP_`, e.g.
/// `APP_PORT=8080`.
#[derive(Debug, Deserialize)]
pub struct EnvConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub session_secret: Option<String>,
    #[serde(default)]
    pub session_cookie_secure: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_file_bytes() -> usize {
    100 * 1024 * 1024
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Loads configuration from environment variables prefixed `APP_`.
pub fn from_env() -> Result<EnvConfig, envy::Error> {
    envy::prefixed("APP_").from_env::<EnvConfig>()
}

/// Server-wide knobs independent of any single request.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub max_file_bytes: usize,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            max_file_bytes: default_max_file_bytes(),
            request_timeout: Duration::from_secs(default_request_timeout_secs()),
            shutdown_timeout: Duration::from_secs(default_shutdown_timeout_secs()),
        }
    }
}

impl ServerConfig {
    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            host: env.host.clone(),
            port: env.port,
            max_body_bytes: env.max_body_bytes,
            max_file_bytes: env.max_file_bytes,
            request_timeout: Duration::from_secs(env.request_timeout_secs),
            shutdown_timeout: Duration::from_secs(env.shutdown_timeout_secs),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Session-cookie knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub secure: bool,
    pub default_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sessionId".to_string(),
            secure: false,
            default_ttl: crate::session::store::DEFAULT_TTL,
        }
    }
}

impl SessionConfig {
    pub fn from_env(env: &EnvConfig) -> Self {
        Self {
            cookie_name: "sessionId".to_string(),
            secure: env.session_cookie_secure,
            default_ttl: crate::session::store::DEFAULT_TTL,
        }
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}
