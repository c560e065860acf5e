//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use kirana_core::config::ApiConfig;
use kirana_store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the control API.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Build the Axum router with all campaign routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    Router::new()
        .route("/api/v1/campaigns", get(super::routes::list_campaigns))
        .route("/api/v1/campaigns", post(super::routes::create_campaign))
        .route("/api/v1/campaigns/preview", post(super::routes::preview_audience))
        .route("/api/v1/campaigns/{id}", get(super::routes::get_campaign))
        .route("/api/v1/campaigns/{id}", put(super::routes::update_campaign))
        .route("/api/v1/campaigns/{id}", delete(super::routes::delete_campaign))
        .route("/api/v1/campaigns/{id}/send", post(super::routes::send_campaign))
        .route("/api/v1/campaigns/{id}/pause", post(super::routes::pause_campaign))
        .route("/api/v1/campaigns/{id}/resume", post(super::routes::resume_campaign))
        .route(
            "/api/v1/campaigns/{id}/requeue-failed",
            post(super::routes::requeue_failed),
        )
        .route("/api/v1/campaigns/{id}/recipients", get(super::routes::list_recipients))
        .route("/health", get(super::routes::health_check))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server.
pub async fn start(config: &ApiConfig, store: Arc<Store>) -> std::io::Result<()> {
    let app = build_router(AppState { store });
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 control API listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
