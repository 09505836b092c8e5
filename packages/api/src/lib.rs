// ABOUTME: HTTP API layer: routers and handlers over the topology core
// ABOUTME: Integration layer that depends on all domain packages

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub mod alerts_handlers;
pub mod cascade_handlers;
pub mod config_handlers;
pub mod error;
pub mod export_handlers;
pub mod state;
pub mod timeline_handlers;
pub mod topology_handlers;

pub use error::{ApiError, ApiResult};
pub use state::{
    AppState, ConfigAlerts, ConfigAuth, ConfigCache, ConfigDashboards, ConfigGrafana,
    ConfigResponse,
};

/// Liveness and readiness probes.
pub fn create_probe_router() -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(health_check))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Public API routes that skip authentication.
pub fn create_public_router() -> Router<AppState> {
    Router::new().route("/api/v1/config", get(config_handlers::get_config))
}

/// Authenticated API v1 routes.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/topology", get(topology_handlers::get_topology))
        .route("/api/v1/alerts", get(alerts_handlers::get_alerts))
        .route("/api/v1/instances", get(topology_handlers::get_instances))
        .route(
            "/api/v1/cascade-analysis",
            get(cascade_handlers::get_cascade_analysis),
        )
        .route(
            "/api/v1/cascade-graph",
            get(cascade_handlers::get_cascade_graph),
        )
        .route(
            "/api/v1/timeline/events",
            get(timeline_handlers::get_timeline_events),
        )
        .route("/api/v1/export/{format}", get(export_handlers::get_export))
}
