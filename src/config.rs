use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Labwise";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen address for the REST API.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Session tokens live for a day.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
/// Password reset links expire after an hour.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;
pub const DEFAULT_OLLAMA_MODEL: &str = "medgemma";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "labwise=info,tower_http=info"
}

/// Get the application data directory
/// ~/Labwise/ on all platforms; falls back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite file location.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("labwise.db")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration, read from `LABWISE_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_path: PathBuf,
    /// `None` means a random per-process secret is generated at startup.
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,
    /// Base URL of the browser client, used in emailed links.
    pub public_url: String,
    pub password_iterations: u32,
    pub ollama_url: Option<String>,
    pub ollama_model: String,
    pub llm_timeout_secs: u64,
    pub mail_endpoint: Option<String>,
    pub mail_from: String,
    pub cors_origin: Option<String>,
    /// Reverse proxies whose `X-Forwarded-For` is believed. Empty means the
    /// peer address is the client.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_path: default_database_path(),
            jwt_secret: None,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            public_url: "http://localhost:3000".into(),
            password_iterations: crate::crypto::PBKDF2_ITERATIONS,
            ollama_url: None,
            ollama_model: DEFAULT_OLLAMA_MODEL.into(),
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            mail_endpoint: None,
            mail_from: "no-reply@labwise.local".into(),
            cors_origin: None,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("LABWISE_BIND") {
            config.bind = v.parse().map_err(|_| ConfigError::Invalid {
                key: "LABWISE_BIND",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("LABWISE_DB_PATH") {
            config.database_path = PathBuf::from(v);
        }
        config.jwt_secret = get("LABWISE_JWT_SECRET");
        if let Some(v) = get("LABWISE_TOKEN_TTL_HOURS") {
            config.token_ttl_hours = v
                .parse()
                .ok()
                .filter(|h: &i64| *h > 0)
                .ok_or(ConfigError::Invalid {
                    key: "LABWISE_TOKEN_TTL_HOURS",
                    value: v.clone(),
                })?;
        }
        if let Some(v) = get("LABWISE_PUBLIC_URL") {
            config.public_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("LABWISE_PASSWORD_ITERATIONS") {
            config.password_iterations = v
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .ok_or(ConfigError::Invalid {
                    key: "LABWISE_PASSWORD_ITERATIONS",
                    value: v.clone(),
                })?;
        }
        config.ollama_url = get("LABWISE_OLLAMA_URL");
        if let Some(v) = get("LABWISE_OLLAMA_MODEL") {
            config.ollama_model = v;
        }
        if let Some(v) = get("LABWISE_LLM_TIMEOUT_SECS") {
            config.llm_timeout_secs = v.parse().map_err(|_| ConfigError::Invalid {
                key: "LABWISE_LLM_TIMEOUT_SECS",
                value: v.clone(),
            })?;
        }
        config.mail_endpoint = get("LABWISE_MAIL_ENDPOINT");
        if let Some(v) = get("LABWISE_MAIL_FROM") {
            config.mail_from = v;
        }
        config.cors_origin = get("LABWISE_CORS_ORIGIN");
        if let Some(v) = get("LABWISE_TRUSTED_PROXY") {
            config.trusted_proxies = v
                .split(',')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(|ip| {
                    ip.parse().map_err(|_| ConfigError::Invalid {
                        key: "LABWISE_TRUSTED_PROXY",
                        value: v.clone(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }
}
