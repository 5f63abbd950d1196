//! Turn processor: classifies the fragments of one streamed model turn.

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{trace, warn};

use gemini_chat_core::types::{FunctionCall, PartKind, StreamEvent};
use gemini_chat_providers::{ProviderError, TurnStream};

/// What one model turn produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The function the model asked for, if any. Only the last one counts.
    pub pending_call: Option<FunctionCall>,
    pub thoughts: String,
    pub answer: String,
}

/// Drain `stream`, forwarding thought and answer text as it arrives.
///
/// Function calls are not forwarded; they surface as a `tool` event once
/// executed.
pub async fn process_turn(
    stream: &mut TurnStream,
    event_tx: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<TurnOutcome, ProviderError> {
    let mut outcome = TurnOutcome::default();

    while let Some(part) = stream.next().await {
        match part?.kind {
            PartKind::Thought(text) => {
                if text.is_empty() {
                    continue;
                }
                outcome.thoughts.push_str(&text);
                let _ = event_tx.send(StreamEvent::Thought(text));
            }
            PartKind::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                outcome.answer.push_str(&text);
                let _ = event_tx.send(StreamEvent::Text(text));
            }
            PartKind::FunctionCall(call) => {
                if let Some(previous) = outcome.pending_call.replace(call) {
                    warn!(dropped = %previous.name, "Model requested more than one function call in a turn; keeping the last");
                }
            }
            PartKind::FunctionResult(result) => {
                trace!(name = %result.name, "Ignoring function result in model output");
            }
        }
    }

    Ok(outcome)
}
