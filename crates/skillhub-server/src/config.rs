//! Environment configuration.
//!
//! Only the variables read here are recognized; anything else in the
//! environment is ignored.

use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub auth_required: bool,
    pub auth_header: String,
    /// Raw API keys; hashed before being held in memory by the manager.
    pub api_keys: Vec<String>,
    pub db_path: String,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_prefix() -> String {
    "/api/v1".to_string()
}

fn default_db_path() -> String {
    "skillhub.db".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_prefix(),
            auth_required: true,
            auth_header: "X-API-Key".to_string(),
            api_keys: Vec::new(),
            db_path: default_db_path(),
            max_concurrent: 100,
            max_queue_size: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("API_HOST").unwrap_or(defaults.host),
            port: env::var("API_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.port),
            api_prefix: env::var("API_PREFIX").unwrap_or(defaults.api_prefix),
            auth_required: env::var("AUTH_REQUIRED")
                .ok()
                .and_then(|value| parse_bool(&value))
                .unwrap_or(defaults.auth_required),
            auth_header: env::var("AUTH_HEADER").unwrap_or(defaults.auth_header),
            api_keys: env::var("SKILLHUB_API_KEYS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|key| !key.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            db_path: env::var("SKILLHUB_DB_PATH").unwrap_or(defaults.db_path),
            max_concurrent: env::var("SKILLHUB_MAX_CONCURRENT")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent),
            max_queue_size: env::var("SKILLHUB_MAX_QUEUE")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.max_queue_size),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
