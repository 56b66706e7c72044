use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{RelayError, Result};

/// Environment variable overriding `upstream.base_url`
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
/// Environment variable overriding `upstream.default_model`
pub const ENV_MODEL: &str = "OPENAI_MODEL";
/// Environment variable overriding `upstream.api_key`
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding `server.port`
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding `server.static_dir`
pub const ENV_STATIC_DIR: &str = "STATIC_DIR";

/// Main configuration structure for chat-relay
///
/// Built once at startup and shared read-only with every request.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Listener and static file configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream chat-completions API configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Parse a config from a TOML file on disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = get(ENV_BASE_URL) {
            self.upstream.base_url = base_url;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.upstream.default_model = model;
        }
        if let Some(api_key) = get(ENV_API_KEY) {
            self.upstream.api_key = Some(api_key);
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| RelayError::Config(format!("Invalid {ENV_PORT} '{port}': {e}")))?;
        }
        if let Some(dir) = get(ENV_STATIC_DIR) {
            self.server.static_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Check that the upstream URL and listen address are usable
    pub fn validate(&self) -> Result<()> {
        self.upstream.parsed_base_url()?;
        self.server.listen_addr()?;
        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served at `/` for anything that isn't the chat endpoint
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl ServerConfig {
    /// Socket address built from `host` and `port`
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address '{addr}': {e}")))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

/// Upstream OpenAI-compatible API configuration
#[derive(Clone, Deserialize)]
pub struct UpstreamConfig {
    /// API root; requests go to `{base_url}/chat/completions`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used when a request doesn't name one
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Bearer credential, omitted from upstream requests when unset
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upstream request timeout in seconds (unset = wait indefinitely)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl UpstreamConfig {
    /// The chat-completions endpoint for this upstream
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn parsed_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            RelayError::Config(format!("Invalid upstream URL '{}': {e}", self.base_url))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(RelayError::Config(format!(
                "Unsupported upstream URL scheme '{scheme}': only http and https are allowed"
            ))),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            api_key: None,
            timeout_secs: None,
        }
    }
}

// Keeps the credential out of `{:?}` logging.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
