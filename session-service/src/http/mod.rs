//! HTTP API for the surrounding note service.
//!
//! Routes under `/api/v1/sessions` cover the identity exchange, refresh,
//! logout, and the device list; `/health` is unauthenticated.

mod extract;
mod handlers;

pub use extract::AuthContext;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::services::{SessionManager, TokenService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub tokens: Arc<TokenService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/sessions",
            post(handlers::create_session)
                .get(handlers::list_sessions)
                .delete(handlers::revoke_all_sessions),
        )
        .route("/api/v1/sessions/refresh", post(handlers::refresh_session))
        .route("/api/v1/sessions/current", delete(handlers::logout_current))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
