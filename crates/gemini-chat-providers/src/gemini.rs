//! Google Generative AI (Gemini) session.
//!
//! Streams via the `streamGenerateContent` endpoint with SSE. Auth is via the
//! `x-goog-api-key` header.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace, warn};

use gemini_chat_core::config::ThinkingConfig;
use gemini_chat_core::types::{ConversationTurn, Part, TurnContent};

use crate::sse::{SseEvent, parse_sse_stream};
use crate::{
    ModelClient, ModelSession, ProviderError, SessionConfig, ToolDefinition, Transcript,
    TurnStream,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Opens Gemini sessions. Holds only the API key and a pooled HTTP client;
/// all per-request settings travel in [`SessionConfig`].
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ModelClient for GeminiClient {
    fn id(&self) -> &str {
        "google"
    }

    fn open(&self, history: Vec<ConversationTurn>, config: SessionConfig) -> Box<dyn ModelSession> {
        Box::new(GeminiSession {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            client: self.client.clone(),
            config,
            transcript: Transcript::new(history),
        })
    }
}

/// One conversation with a Gemini model.
pub struct GeminiSession {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    config: SessionConfig,
    transcript: Transcript,
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<ConversationTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    thinking_config: &'a ThinkingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl GeminiStreamChunk {
    /// Parts of the first candidate, in emission order.
    fn into_parts(self) -> Vec<Part> {
        if let Some(usage) = &self.usage_metadata {
            trace!(
                input_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                thought_tokens = usage.thoughts_token_count,
                "Gemini usage"
            );
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            warn!(reason, "Gemini blocked the prompt");
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Vec::new();
        };
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                debug!(reason, "Gemini finish reason");
            }
        }

        candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Part>(raw) {
                Ok(part) => Some(part),
                Err(e) => {
                    trace!(%e, "Skipping unsupported Gemini part");
                    None
                }
            })
            .collect()
    }
}

/// Format tool definitions as a single `functionDeclarations` tool.
pub fn format_tools(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
    if tools.is_empty() {
        return Vec::new();
    }
    let declarations: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters_schema,
            })
        })
        .collect();

    vec![json!({ "functionDeclarations": declarations })]
}

/// Map a non-success response to a [`ProviderError`], pulling the message out
/// of Google's error envelope when there is one.
fn api_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.trim().to_string()
            }
        });

    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        ProviderError::Overloaded(message)
    } else {
        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Turn an SSE event stream into response parts.
fn decode_stream<S>(sse: S) -> impl Stream<Item = Result<Part, ProviderError>> + Send
where
    S: Stream<Item = Result<SseEvent, ProviderError>> + Send + 'static,
{
    futures::stream::unfold(
        GeminiChunkState {
            sse: Box::pin(sse),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(part) = state.pending.pop_front() {
                    return Some((Ok(part), state));
                }
                match state.sse.next().await {
                    Some(Ok(event)) => {
                        match serde_json::from_str::<GeminiStreamChunk>(event.data.trim()) {
                            Ok(chunk) => state.pending.extend(chunk.into_parts()),
                            Err(e) => trace!(%e, "Failed to parse Gemini chunk"),
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), state)),
                    None => return None,
                }
            }
        },
    )
}

struct GeminiChunkState {
    sse: Pin<Box<dyn Stream<Item = Result<SseEvent, ProviderError>> + Send>>,
    pending: VecDeque<Part>,
}

impl GeminiSession {
    fn build_request(&self, pending: &ConversationTurn) -> GeminiRequest<'_> {
        GeminiRequest {
            contents: self.transcript.with_pending(pending),
            system_instruction: self
                .config
                .system_instruction
                .as_ref()
                .map(|s| json!({ "parts": [{ "text": s }] })),
            tools: format_tools(&self.config.tools),
            generation_config: GenerationConfig {
                thinking_config: &self.config.thinking,
            },
        }
    }
}

#[async_trait]
impl ModelSession for GeminiSession {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_turn(&mut self, content: &TurnContent) -> Result<TurnStream, ProviderError> {
        let pending = content.to_turn();
        let body = self.build_request(&pending);

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.config.model
        );

        debug!(model = %self.config.model, turns = body.contents.len(), "Streaming Gemini API");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let parts = decode_stream(parse_sse_stream(response.bytes_stream()));
        Ok(TurnStream::new(pending, Box::pin(parts)))
    }

    async fn finish_turn(&mut self, turn: TurnStream) -> Result<(), ProviderError> {
        self.transcript.commit(turn)
    }

    fn full_history(&self) -> &[ConversationTurn] {
        self.transcript.turns()
    }
}
