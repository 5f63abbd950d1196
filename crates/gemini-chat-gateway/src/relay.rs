//! Stream relay: turns conversation events into a newline-delimited JSON
//! response body.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::error;

use gemini_chat_core::types::StreamEvent;

pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// One `{"type": ..., "data": ...}` line, newline included.
pub fn encode_event(event: &StreamEvent) -> Bytes {
    match serde_json::to_vec(event) {
        Ok(mut line) => {
            line.push(b'\n');
            Bytes::from(line)
        }
        Err(e) => {
            error!(kind = event.kind(), error = %e, "Failed to encode stream event");
            Bytes::from_static(b"{\"type\":\"error\",\"data\":\"failed to encode event\"}\n")
        }
    }
}

/// A `200` response whose body yields each event as soon as it is sent.
/// The body ends when every sender is dropped.
pub fn stream_response(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Response {
    let lines = UnboundedReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(encode_event(&event)));

    let mut response = Response::new(Body::from_stream(lines));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
