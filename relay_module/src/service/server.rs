use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::config::RelayConfig;
use super::db::insert_record;
use super::drive::{drive_notification, setup_watch};
use super::state::RelayState;
use super::whatsapp::{ingest_whatsapp, verify_whatsapp_webhook};
use super::BoxError;

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn hello() -> impl IntoResponse {
    Json(json!({"Hello": "World"}))
}

pub fn build_router(state: Arc<RelayState>) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/api/hello", get(hello))
        .route(
            "/whatsapp/webhook",
            get(verify_whatsapp_webhook).post(ingest_whatsapp),
        )
        .route("/gdrive/webhook", post(drive_notification))
        .route("/gdrive/setup-watch", post(setup_watch))
        .route("/db/insert", post(insert_record))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(
    config: RelayConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(RelayState::new(config)?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("relay gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
