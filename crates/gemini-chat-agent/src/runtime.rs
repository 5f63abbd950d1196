//! Conversation loop: stream a turn, run the requested tool, feed the result
//! back, and repeat until the model answers without a tool call.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use gemini_chat_core::config::Config;
use gemini_chat_core::types::{FunctionCall, FunctionResult, StreamEvent, ToolInvocation, TurnContent};
use gemini_chat_providers::{ModelSession, ProviderError};
use gemini_chat_tools::{ToolContext, ToolRegistry};

use crate::retry::{RetryPolicy, send_with_retry};
use crate::turn::{TurnOutcome, process_turn};

/// Knobs for one conversation run.
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    pub retry: RetryPolicy,
    /// Stop once this many tools have run. `None` runs until the model stops
    /// asking for tools.
    pub max_tool_iterations: Option<u32>,
}

impl LoopOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            max_tool_iterations: config.max_tool_iterations(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The model answered; the history event was sent.
    Completed,
    /// The model call failed for good.
    Failed(String),
    /// The model asked for a tool that is not registered.
    UnknownTool(String),
    /// The tool-call guard tripped.
    IterationLimit(u32),
    /// The client went away before the next turn.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Model turns fully streamed.
    pub turns: u32,
    pub tool_calls: u32,
    pub duration: Duration,
}

enum LoopState {
    AwaitingFirstTurn,
    StreamingTurn(TurnContent),
    ToolPending(FunctionCall),
    Done,
    Failed(String),
}

/// Stream one turn and confirm it with the session.
async fn stream_turn(
    session: &mut dyn ModelSession,
    content: &TurnContent,
    policy: &RetryPolicy,
    event_tx: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<TurnOutcome, ProviderError> {
    let mut stream = send_with_retry(session, content, policy).await?;
    let outcome = process_turn(&mut stream, event_tx).await?;
    session.finish_turn(stream).await?;
    Ok(outcome)
}

/// Run one request's conversation against `session`, emitting events on
/// `event_tx` as they are produced.
///
/// Only normal completion ends with a `history` event. Every failure path
/// emits a single `error` event and no history.
pub async fn run_conversation(
    session: &mut dyn ModelSession,
    message: &str,
    tools: &ToolRegistry,
    context: &ToolContext,
    options: &LoopOptions,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
) -> RunOutcome {
    let start = Instant::now();
    let mut turns: u32 = 0;
    let mut tool_calls: u32 = 0;
    let mut state = LoopState::AwaitingFirstTurn;

    let status = loop {
        state = match state {
            LoopState::AwaitingFirstTurn => {
                LoopState::StreamingTurn(TurnContent::Text(message.to_string()))
            }

            LoopState::StreamingTurn(content) => {
                if event_tx.is_closed() {
                    info!(turns, "Client disconnected, stopping conversation");
                    break RunStatus::Disconnected;
                }
                debug!(turn = turns + 1, model = %session.model(), "Sending turn");
                match stream_turn(session, &content, &options.retry, &event_tx).await {
                    Ok(outcome) => {
                        turns += 1;
                        debug!(
                            turn = turns,
                            thought_chars = outcome.thoughts.len(),
                            answer_chars = outcome.answer.len(),
                            tool = outcome.pending_call.as_ref().map(|c| c.name.as_str()),
                            "Turn streamed"
                        );
                        match outcome.pending_call {
                            Some(call) => LoopState::ToolPending(call),
                            None => LoopState::Done,
                        }
                    }
                    Err(e) => LoopState::Failed(e.to_string()),
                }
            }

            LoopState::ToolPending(call) => {
                if let Some(limit) = options.max_tool_iterations.filter(|limit| tool_calls >= *limit) {
                    warn!(limit, tool = %call.name, "Tool call limit reached");
                    let _ = event_tx.send(StreamEvent::Error(format!(
                        "Tool call limit reached ({limit}); stopping."
                    )));
                    break RunStatus::IterationLimit(limit);
                }

                let Some(result) = tools.invoke(&call.name, &call.args, context).await else {
                    error!(tool = %call.name, "Model requested an unknown tool");
                    let _ = event_tx.send(StreamEvent::Error(format!("Unknown tool: {}", call.name)));
                    break RunStatus::UnknownTool(call.name);
                };
                tool_calls += 1;

                let mut response = FunctionResult::new(&call.name, &result);
                response.id = call.id.clone();
                let _ = event_tx.send(StreamEvent::Tool(ToolInvocation {
                    name: call.name,
                    args: call.args,
                    result,
                }));
                LoopState::StreamingTurn(TurnContent::FunctionResult(response))
            }

            LoopState::Done => {
                let history = session.full_history().to_vec();
                let _ = event_tx.send(StreamEvent::History(history));
                break RunStatus::Completed;
            }

            LoopState::Failed(reason) => {
                error!(error = %reason, "Conversation failed");
                let _ = event_tx.send(StreamEvent::Error(reason.clone()));
                break RunStatus::Failed(reason);
            }
        };
    };

    let duration = start.elapsed();
    info!(
        ?status,
        turns,
        tool_calls,
        duration_ms = duration.as_millis() as u64,
        "Conversation finished"
    );

    RunOutcome {
        status,
        turns,
        tool_calls,
        duration,
    }
}
