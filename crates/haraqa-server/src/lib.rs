//! HTTP broker surface for haraqa.
//!
//! Thin translation layer: handlers parse paths, query parameters and
//! headers, call the [`Queue`] engine, and map the result onto the wire
//! contract (status codes, `X-*` headers, raw or JSON bodies). Handlers are
//! written against `Arc<dyn Queue>` so integration tests can run the real
//! router over a temporary data directory, and unit tests can fake the
//! engine entirely.

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use haraqa_storage::Queue;

pub mod error;
pub mod handlers;

pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn Queue>,
}

/// Create the broker router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/topics", get(handlers::topics::list_topics))
        .route(
            "/topics/:topic",
            get(handlers::topics::get_topic)
                .put(handlers::topics::create_topic)
                .delete(handlers::topics::delete_topic)
                .patch(handlers::topics::modify_topic)
                .post(handlers::produce::produce),
        )
        .route(
            "/groups/:group/topics/:topic",
            get(handlers::groups::get_group_offset).put(handlers::groups::commit_group_offset),
        )
        .route("/health", get(handlers::health::health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve the router until ctrl-c.
pub async fn serve(
    router: Router,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "haraqa broker listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}
