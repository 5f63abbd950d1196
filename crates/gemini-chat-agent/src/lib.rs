//! Conversation orchestration: drives a model session through tool-calling
//! turns and produces a stream of [`StreamEvent`]s for the HTTP relay.
//!
//! [`StreamEvent`]: gemini_chat_core::types::StreamEvent

pub mod retry;
pub mod runtime;
pub mod turn;

pub use retry::{RetryPolicy, send_with_retry};
pub use runtime::{LoopOptions, RunOutcome, RunStatus, run_conversation};
pub use turn::{TurnOutcome, process_turn};
