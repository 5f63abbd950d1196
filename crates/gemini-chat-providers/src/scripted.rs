//! In-memory model client driven by a fixed script.
//!
//! Each `send_turn` pops the next [`ScriptStep`]. Sessions opened from the same
//! client share one script, so a test can hand the client to a server and
//! inspect what was sent afterwards.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;

use gemini_chat_core::types::{ConversationTurn, Part, TurnContent};

use crate::{
    FragmentStream, ModelClient, ModelSession, ProviderError, SessionConfig, Transcript,
    TurnStream,
};

/// What the fake model does in response to one `send_turn`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Stream these parts and end normally.
    Reply(Vec<Part>),
    /// Fail the call with an HTTP 503.
    Overloaded,
    /// Fail the call with any other status.
    Reject { status: u16, message: String },
    /// Stream some parts, then break the stream with an error.
    Interrupted { parts: Vec<Part>, message: String },
    /// Stream these parts, then keep the turn open forever.
    Stall(Vec<Part>),
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    sent: Vec<TurnContent>,
    opened: Vec<(Vec<ConversationTurn>, SessionConfig)>,
}

/// Client whose sessions replay [`ScriptStep`]s.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModelClient {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedModelClient {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                steps: steps.into_iter().collect(),
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of `send_turn` calls made across all sessions.
    pub fn calls(&self) -> usize {
        self.lock().sent.len()
    }

    /// Everything sent to the model, in order.
    pub fn sent(&self) -> Vec<TurnContent> {
        self.lock().sent.clone()
    }

    /// History and settings each session was opened with.
    pub fn opened(&self) -> Vec<(Vec<ConversationTurn>, SessionConfig)> {
        self.lock().opened.clone()
    }
}

impl ModelClient for ScriptedModelClient {
    fn id(&self) -> &str {
        "scripted"
    }

    fn open(&self, history: Vec<ConversationTurn>, config: SessionConfig) -> Box<dyn ModelSession> {
        self.lock().opened.push((history.clone(), config.clone()));
        Box::new(ScriptedSession {
            client: self.clone(),
            model: config.model,
            transcript: Transcript::new(history),
        })
    }
}

pub struct ScriptedSession {
    client: ScriptedModelClient,
    model: String,
    transcript: Transcript,
}

fn fragments(parts: Vec<Part>, tail: Option<String>) -> FragmentStream {
    let mut items: Vec<Result<Part, ProviderError>> = parts.into_iter().map(Ok).collect();
    if let Some(message) = tail {
        items.push(Err(ProviderError::Stream(message)));
    }
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl ModelSession for ScriptedSession {
    fn model(&self) -> &str {
        &self.model
    }

    async fn send_turn(&mut self, content: &TurnContent) -> Result<TurnStream, ProviderError> {
        let step = {
            let mut state = self.client.lock();
            state.sent.push(content.clone());
            state.steps.pop_front()
        };
        let request = content.to_turn();

        match step {
            Some(ScriptStep::Reply(parts)) => Ok(TurnStream::new(request, fragments(parts, None))),
            Some(ScriptStep::Interrupted { parts, message }) => {
                Ok(TurnStream::new(request, fragments(parts, Some(message))))
            }
            Some(ScriptStep::Stall(parts)) => {
                let stalled = futures::stream::iter(parts.into_iter().map(Ok))
                    .chain(futures::stream::pending());
                Ok(TurnStream::new(request, Box::pin(stalled)))
            }
            Some(ScriptStep::Overloaded) => Err(ProviderError::Overloaded(
                "The model is overloaded. Please try again later.".into(),
            )),
            Some(ScriptStep::Reject { status, message }) => {
                Err(ProviderError::Api { status, message })
            }
            None => Err(ProviderError::Api {
                status: 500,
                message: "script exhausted".into(),
            }),
        }
    }

    async fn finish_turn(&mut self, turn: TurnStream) -> Result<(), ProviderError> {
        self.transcript.commit(turn)
    }

    fn full_history(&self) -> &[ConversationTurn] {
        self.transcript.turns()
    }
}
