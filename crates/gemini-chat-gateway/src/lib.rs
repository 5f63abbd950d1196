//! HTTP gateway.
//!
//! Serves `POST /chat`, which runs one tool-calling conversation per request
//! and relays its events as newline-delimited JSON, plus `GET /health` and
//! the embedded chat page.

pub mod chat;
pub mod relay;
pub mod server;
pub mod state;

pub use server::{router, start_gateway};
pub use state::GatewayState;
