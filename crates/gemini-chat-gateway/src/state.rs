//! Gateway shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use gemini_chat_agent::LoopOptions;
use gemini_chat_core::config::Config;
use gemini_chat_providers::{ModelClient, SessionConfig};
use gemini_chat_tools::{ToolContext, ToolRegistry};

/// State shared by all request handlers. Nothing here is per-conversation;
/// every `/chat` request opens its own session.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub client: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub tool_context: ToolContext,
    pub options: LoopOptions,
    pub started_at: DateTime<Utc>,
    active_requests: AtomicUsize,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, client: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        let tool_context = ToolContext::new(config.workspace_dir(), config.restrict_to_workspace());
        let options = LoopOptions::from_config(&config);
        Self {
            config,
            client,
            tools,
            tool_context,
            options,
            started_at: Utc::now(),
            active_requests: AtomicUsize::new(0),
        }
    }

    /// Session settings for a request naming `model`.
    pub fn session_config(&self, model: &str) -> SessionConfig {
        SessionConfig {
            model: model.to_string(),
            thinking: self.config.thinking_for(model),
            tools: self.tools.definitions(),
            system_instruction: self.config.system_instruction(),
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// Count a conversation as in flight until the guard drops.
    pub fn track_request(self: &Arc<Self>) -> ActiveRequest {
        self.active_requests.fetch_add(1, Ordering::SeqCst);
        ActiveRequest {
            state: Arc::clone(self),
        }
    }
}

pub struct ActiveRequest {
    state: Arc<GatewayState>,
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.state.active_requests.fetch_sub(1, Ordering::SeqCst);
    }
}
