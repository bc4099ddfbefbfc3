//! HTTP surface: router, middleware, and lifecycle.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;

pub use error::{ServerError, ServerResult};
pub use state::AppState;

/// All routes plus middleware. Outermost layer listed last.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/extract-embedding", post(routes::extract_embedding))
        .route("/compare-embedding", post(routes::compare_embedding))
        .route("/health", get(routes::health))
        .method_not_allowed_fallback(routes::method_not_allowed)
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn_with_state(state.clone(), middleware::timeout_body))
        .layer(from_fn(middleware::log_requests))
        .layer(from_fn(middleware::request_id))
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.socket_addr()?;
    log::info!(
        "listening on {} (threshold {}, {} worker(s), max upload {}MB, timeout {}s)",
        addr,
        state.comparator.threshold(),
        state.extractors.workers(),
        state.config.max_upload_mb,
        state.config.timeout_secs
    );

    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("received Ctrl+C, shutting down"),
        _ = terminate => log::info!("received SIGTERM, shutting down"),
    }
}
