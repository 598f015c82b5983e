//! SkillHub HTTP server.
//!
//! Routes live under the configured API prefix (default `/api/v1`); the
//! root banner and health check stay public.

mod api;
mod config;
mod middleware;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use api::state::AppState;
use api::{discovery::*, health::*, invoke::*, orchestrate::*, skills::*};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use config::ServerConfig;
use skillhub_core::engine::SchedulerConfig;
use skillhub_core::AppCore;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skillhub_server=debug".into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        prefix = %config.api_prefix,
        auth_required = config.auth_required,
        "Starting SkillHub server"
    );

    let core = Arc::new(
        AppCore::new(
            &config.db_path,
            SchedulerConfig {
                max_concurrent: config.max_concurrent,
                max_queue_size: config.max_queue_size,
            },
        )
        .expect("Failed to initialize SkillHub core"),
    );

    let bind_addr = format!("{}:{}", config.host, config.port);
    let prefix = config.api_prefix.clone();
    let state = AppState::new(core, config);

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ]);

    let skill_routes = Router::new()
        .route("/health", get(health))
        .route("/skill/register", post(register_skill))
        .route("/skill/invoke", post(invoke_skill))
        .route("/skill/status/{execution_id}", get(execution_status))
        .route("/skill/discovery", get(discover_skills))
        .route("/skill/orchestrate", post(orchestrate))
        .route(
            "/skill/{skill_id}",
            get(get_skill).delete(delete_skill),
        );

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(&prefix, skill_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {bind_addr}: {e}"));

    tracing::info!("SkillHub listening on http://{bind_addr}");

    axum::serve(listener, app)
        .await
        .expect("Failed to run axum server");
}
