//! Application state shared across all API handlers.

use crate::config::ServerConfig;
use crate::middleware::auth::ApiKeyManager;
use skillhub_core::AppCore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
    pub config: Arc<ServerConfig>,
    pub keys: Arc<ApiKeyManager>,
}

impl AppState {
    pub fn new(core: Arc<AppCore>, config: ServerConfig) -> Self {
        let keys = Arc::new(ApiKeyManager::from_keys(&config.api_keys));
        Self {
            core,
            config: Arc::new(config),
            keys,
        }
    }
}
