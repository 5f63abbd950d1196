//! `POST /chat`: runs one conversation and relays its events.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use gemini_chat_agent::run_conversation;
use gemini_chat_core::types::{ConversationTurn, StreamEvent};

use crate::relay;
use crate::state::GatewayState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    /// Transcript returned by an earlier exchange, replayed verbatim.
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn chat_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    if request.message.trim().is_empty() {
        warn!("Rejecting chat request with an empty message");
        let _ = event_tx.send(StreamEvent::Error("message must not be empty".into()));
        return relay::stream_response(event_rx);
    }

    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.config.default_model());
    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id, model = %model);

    let mut session = state
        .client
        .open(request.history, state.session_config(&model));
    let active = state.track_request();
    let message = request.message;

    tokio::spawn(
        async move {
            let outcome = run_conversation(
                session.as_mut(),
                &message,
                &state.tools,
                &state.tool_context,
                &state.options,
                event_tx.clone(),
            )
            .await;
            debug!(status = ?outcome.status, "Chat request done");
            // Release the slot before the body ends.
            drop(active);
            drop(event_tx);
        }
        .instrument(span),
    );

    relay::stream_response(event_rx)
}
