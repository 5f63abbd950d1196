//! Remote model session abstraction.
//!
//! A [`ModelClient`] opens one [`ModelSession`] per request, seeded with the
//! history the browser sent back. Each call to [`ModelSession::send_turn`]
//! returns a [`TurnStream`] of response fragments; once that stream has been
//! drained, [`ModelSession::finish_turn`] folds the exchange into the
//! session's transcript.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use gemini_chat_core::config::ThinkingConfig;
use gemini_chat_core::types::{ConversationTurn, Part, Role, TurnContent};

pub mod gemini;
#[cfg(feature = "testing")]
pub mod scripted;
pub mod sse;

pub use gemini::GeminiClient;

/// Errors from the remote model.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The upstream service is temporarily overloaded (HTTP 503).
    #[error("Gemini API overloaded (503): {0}")]
    Overloaded(String),

    /// Any other non-success response: auth, quota, malformed request.
    #[error("Gemini API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Turn stream was not fully consumed")]
    Unfinished,
}

impl ProviderError {
    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Overloaded(_))
    }
}

/// A function declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Per-request session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub thinking: ThinkingConfig,
    pub tools: Vec<ToolDefinition>,
    pub system_instruction: Option<String>,
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Part, ProviderError>> + Send>>;

/// The streamed response to one `send_turn` call.
///
/// Every fragment that passes through is recorded so the session can rebuild
/// the model turn once the stream is exhausted.
pub struct TurnStream {
    request: ConversationTurn,
    inner: FragmentStream,
    received: Vec<Part>,
    finished: bool,
}

impl TurnStream {
    pub fn new(request: ConversationTurn, inner: FragmentStream) -> Self {
        Self {
            request,
            inner,
            received: Vec::new(),
            finished: false,
        }
    }

    /// True once the underlying stream has signalled its end.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Split into the sent user turn and the aggregated model turn.
    pub fn into_turns(self) -> Result<(ConversationTurn, ConversationTurn), ProviderError> {
        if !self.finished {
            return Err(ProviderError::Unfinished);
        }
        let mut reply = ConversationTurn::new(Role::Model);
        for part in self.received {
            reply.push_part(part);
        }
        Ok((self.request, reply))
    }
}

impl Stream for TurnStream {
    type Item = Result<Part, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(part))) => {
                this.received.push(part.clone());
                Poll::Ready(Some(Ok(part)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The authoritative transcript held by a session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// History plus the turn about to be sent, as the request `contents`.
    pub fn with_pending(&self, pending: &ConversationTurn) -> Vec<ConversationTurn> {
        let mut contents = Vec::with_capacity(self.turns.len() + 1);
        contents.extend_from_slice(&self.turns);
        contents.push(pending.clone());
        contents
    }

    /// Append a completed exchange. A reply with no parts leaves the
    /// transcript untouched, request included.
    pub fn commit(&mut self, turn: TurnStream) -> Result<(), ProviderError> {
        let (request, reply) = turn.into_turns()?;
        if reply.is_empty() {
            warn!("Model returned an empty turn; transcript unchanged");
            return Ok(());
        }
        self.turns.push(request);
        self.turns.push(reply);
        Ok(())
    }
}

/// A stateful, turn-based exchange with a model.
#[async_trait]
pub trait ModelSession: Send {
    /// Model identifier this session talks to.
    fn model(&self) -> &str;

    /// Send user text or a tool result and start streaming the reply.
    async fn send_turn(&mut self, content: &TurnContent) -> Result<TurnStream, ProviderError>;

    /// Confirm a fully consumed turn and fold it into the transcript.
    async fn finish_turn(&mut self, turn: TurnStream) -> Result<(), ProviderError>;

    /// The transcript so far. Only complete after `finish_turn`.
    fn full_history(&self) -> &[ConversationTurn];
}

/// Opens sessions against one model backend.
pub trait ModelClient: Send + Sync {
    /// Backend identifier (e.g. "google").
    fn id(&self) -> &str;

    fn open(&self, history: Vec<ConversationTurn>, config: SessionConfig) -> Box<dyn ModelSession>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemini_chat_core::types::PartKind;
    use tokio_stream::StreamExt;

    fn stream_of(parts: Vec<Part>) -> FragmentStream {
        Box::pin(futures::stream::iter(parts.into_iter().map(Ok)))
    }

    #[tokio::test]
    async fn test_turn_stream_records_and_aggregates() {
        let mut turn = TurnStream::new(
            ConversationTurn::user_text("hi"),
            stream_of(vec![Part::thought("a"), Part::thought("b"), Part::text("c")]),
        );
        let mut seen = 0;
        while let Some(part) = turn.next().await {
            part.unwrap();
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert!(turn.is_finished());

        let (request, reply) = turn.into_turns().unwrap();
        assert_eq!(request.role, Role::User);
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.parts.len(), 2);
        assert_eq!(reply.parts[0].kind, PartKind::Thought("ab".into()));
    }

    #[test]
    fn test_unconsumed_turn_cannot_commit() {
        let turn = TurnStream::new(ConversationTurn::user_text("hi"), stream_of(vec![]));
        let mut transcript = Transcript::default();
        assert!(matches!(
            transcript.commit(turn),
            Err(ProviderError::Unfinished)
        ));
        assert!(transcript.turns().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_leaves_transcript_unchanged() {
        let mut turn = TurnStream::new(ConversationTurn::user_text("hi"), stream_of(vec![]));
        assert!(turn.next().await.is_none());
        let mut transcript = Transcript::new(vec![ConversationTurn::user_text("earlier")]);
        transcript.commit(turn).unwrap();
        assert_eq!(transcript.turns().len(), 1);
    }

    #[test]
    fn test_only_overload_is_transient() {
        assert!(ProviderError::Overloaded("busy".into()).is_transient());
        assert!(
            !ProviderError::Api {
                status: 429,
                message: "quota".into()
            }
            .is_transient()
        );
        assert!(!ProviderError::Stream("reset".into()).is_transient());
    }
}
