//! Configuration management for Leslie.
//!
//! Configuration can be set via environment variables:
//! - `PORT` - Optional. Server port. Defaults to `8080`.
//! - `HOST` - Optional. Server host. Defaults to `0.0.0.0`.
//! - `GOOGLE_API_KEY` - Optional. Gemini API key. Without it the server still
//!   starts, but every model call fails.
//! - `GEMINI_BASE_URL` - Optional. Gemini REST endpoint root.
//! - `SERVE_WEB_INTERFACE` - Optional. Serve the bundled web UI. Defaults to `true`.
//! - `ALLOWED_ORIGINS` - Optional. Comma-separated CORS allow-list override.
//! - `MAX_ITERATIONS` - Optional. Maximum model calls per run. Defaults to `10`.

use thiserror::Error;

/// Origins allowed to call the API when `ALLOWED_ORIGINS` is not set.
///
/// The trailing wildcard keeps development frontends working; it also makes
/// the explicit entries redundant.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 6] = [
    "http://localhost",
    "http://localhost:8080",
    "http://localhost:3000",
    "https://localhost",
    "https://projectleslie.vercel.app",
    "*",
];

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Gemini API key
    pub api_key: Option<String>,

    /// Gemini REST endpoint root (no trailing `/models`)
    pub gemini_base_url: String,

    /// Whether the bundled web UI is mounted
    pub serve_web_interface: bool,

    /// CORS allow-list, in configured order
    pub allowed_origins: Vec<String>,

    /// Maximum model calls per run
    pub max_iterations: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `PORT`, `MAX_ITERATIONS` or
    /// `SERVE_WEB_INTERFACE` is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = lookup("PORT")
            .map(|v| {
                v.trim()
                    .parse::<u16>()
                    .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))
            })
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let api_key = lookup("GOOGLE_API_KEY").filter(|k| !k.trim().is_empty());

        let gemini_base_url = lookup("GEMINI_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());

        let serve_web_interface = lookup("SERVE_WEB_INTERFACE")
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("SERVE_WEB_INTERFACE".to_string(), e))
            })
            .transpose()?
            .unwrap_or(true);

        let allowed_origins = match lookup("ALLOWED_ORIGINS") {
            Some(raw) => {
                let origins = parse_origins(&raw);
                if origins.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "ALLOWED_ORIGINS".to_string(),
                        "expected at least one origin".to_string(),
                    ));
                }
                origins
            }
            None => default_origins(),
        };

        let max_iterations = lookup("MAX_ITERATIONS")
            .map(|v| {
                v.trim().parse::<usize>().map_err(|e| {
                    ConfigError::InvalidValue("MAX_ITERATIONS".to_string(), format!("{}", e))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            host,
            port,
            api_key,
            gemini_base_url,
            serve_web_interface,
            allowed_origins,
            max_iterations,
        })
    }

    /// Create a config with default values (useful for testing).
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            serve_web_interface: true,
            allowed_origins: default_origins(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the allow-list contains the `*` wildcard.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn default_origins() -> Vec<String> {
    DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect()
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
