//! Axum-based HTTP server.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::chat::chat_handler;
use crate::state::GatewayState;

/// Build the gateway router.
///
/// When `ui_enabled` is true, the embedded chat page is served at `/`.
pub fn router(state: Arc<GatewayState>, ui_enabled: bool) -> Router {
    // /chat and /health are registered first so they take priority over the UI catch-all
    let mut app = Router::new()
        .route("/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    if ui_enabled {
        app = app.merge(gemini_chat_web::ui_router());
    }

    app.layer(TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn start_gateway(
    state: Arc<GatewayState>,
    port: u16,
    ui_enabled: bool,
) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let app = router(state, ui_enabled);

    if ui_enabled {
        info!("Chat UI available at http://{bind_addr}:{port}/");
    }

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "model": state.config.default_model(),
        "tools": state.tools.list(),
        "started_at": state.started_at.to_rfc3339(),
        "active_requests": state.active_requests(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
