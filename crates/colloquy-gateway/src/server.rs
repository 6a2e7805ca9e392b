// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use colloquy_config::model::ServerConfig;
use colloquy_core::ColloquyError;
use colloquy_session::ConversationService;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<ConversationService>,
}

impl GatewayState {
    pub fn new(service: ConversationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Build the router:
/// - POST /ask
/// - GET /healthz
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ask", post(handlers::post_ask))
        .route("/healthz", get(handlers::get_healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `shutdown` is cancelled.
///
/// In-flight requests finish before this returns.
pub async fn serve(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ColloquyError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ColloquyError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!(%addr, "gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ColloquyError::Internal(format!("gateway server error: {e}")))?;

    info!("gateway stopped");
    Ok(())
}
