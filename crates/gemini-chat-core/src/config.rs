//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_PORT: u16 = 3000;

/// Top-level Gemini Chat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Serve the embedded chat page at `/`.
    #[serde(default = "default_true")]
    pub ui: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true() -> bool {
    true
}

/// Remote model settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Reasoning token budget for the fast (`flash`) tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,

    /// Reasoning level for the high-capability (`pro`) tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<ThinkingLevel>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl ModelConfig {
    /// Resolve the API key: `api_key` first, then the `api_key_env` variable
    /// (default `GEMINI_API_KEY`).
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some(DEFAULT_API_KEY_ENV.to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

/// Qualitative reasoning level understood by the high-capability tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    #[default]
    Low,
    High,
}

/// Reasoning knobs sent in `generationConfig.thinkingConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub include_thoughts: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<ThinkingLevel>,
}

impl ThinkingConfig {
    /// Pick the knobs for a model identifier. `flash` models get a token
    /// budget, `pro` models get a level; anything else only asks for thoughts.
    pub fn for_model(model: &str, budget: u32, level: ThinkingLevel) -> Self {
        Self {
            include_thoughts: true,
            thinking_budget: model.contains("flash").then_some(budget),
            thinking_level: model.contains("pro").then_some(level),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Attempts per turn when the model reports overload (default: 3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Base retry delay; attempt `k` waits `k * retry_delay_ms` (default: 2000).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,

    /// Stop after this many tool calls in one request. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<u32>,

    /// Root directory for the file tools (default: current directory).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    /// Reject absolute tool paths outside the workspace.
    #[serde(default)]
    pub restrict_to_workspace: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "gemini_chat_agent=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Resolve the config file path.
    pub fn config_dir() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Root directory handed to the file tools.
    pub fn workspace_dir(&self) -> PathBuf {
        self.agent
            .as_ref()
            .and_then(|a| a.workspace.as_ref())
            .map(|w| PathBuf::from(shellexpand::tilde(w).as_ref()))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn restrict_to_workspace(&self) -> bool {
        self.agent
            .as_ref()
            .is_some_and(|a| a.restrict_to_workspace)
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn ui_enabled(&self) -> bool {
        self.gateway.as_ref().is_none_or(|g| g.ui)
    }

    /// Model used when a request does not name one.
    pub fn default_model(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        match &self.model {
            Some(m) => m.resolve_api_key(),
            None => ModelConfig::default().resolve_api_key(),
        }
    }

    pub fn base_url(&self) -> Option<String> {
        self.model.as_ref().and_then(|m| m.base_url.clone())
    }

    pub fn system_instruction(&self) -> Option<String> {
        self.model.as_ref().and_then(|m| m.system_instruction.clone())
    }

    /// Thinking knobs for the given model identifier.
    pub fn thinking_for(&self, model: &str) -> ThinkingConfig {
        let budget = self
            .model
            .as_ref()
            .and_then(|m| m.thinking_budget)
            .unwrap_or(1024);
        let level = self
            .model
            .as_ref()
            .and_then(|m| m.thinking_level)
            .unwrap_or_default();
        ThinkingConfig::for_model(model, budget, level)
    }

    pub fn max_attempts(&self) -> u32 {
        self.agent
            .as_ref()
            .and_then(|a| a.max_attempts)
            .unwrap_or(3)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        self.agent
            .as_ref()
            .and_then(|a| a.retry_delay_ms)
            .unwrap_or(2000)
    }

    pub fn max_tool_iterations(&self) -> Option<u32> {
        self.agent.as_ref().and_then(|a| a.max_tool_iterations)
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "model.default_model").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.api_key().is_none() {
            warnings.push(format!(
                "No Gemini API key configured (set model.api_key or {})",
                self.model
                    .as_ref()
                    .and_then(|m| m.api_key_env.as_deref())
                    .unwrap_or(DEFAULT_API_KEY_ENV)
            ));
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        if self.max_attempts() == 0 {
            errors.push("agent.max_attempts must be at least 1".to_string());
        }

        if self.agent.as_ref().is_some_and(|a| a.workspace.is_some()) {
            let ws = self.workspace_dir();
            if !ws.is_dir() {
                warnings.push(format!("Workspace directory not found: {}", ws.display()));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Gemini Chat data: `~/.gemini_chat/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gemini_chat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_GC_KEY", "key-123") };
        let input = r#"{"key": "${TEST_GC_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("key-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_GC_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_GC_TEST}"}"#;
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway_port(), 3000);
        assert_eq!(config.default_model(), "gemini-2.5-flash");
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.retry_delay_ms(), 2000);
        assert_eq!(config.max_tool_iterations(), None);
        assert!(config.ui_enabled());
        assert!(!config.restrict_to_workspace());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080, ui: false },
                model: { default_model: "gemini-3-pro-preview", thinking_level: "high" },
                agent: { max_tool_iterations: 8 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway_port(), 8080);
        assert!(!config.ui_enabled());
        assert_eq!(config.default_model(), "gemini-3-pro-preview");
        assert_eq!(config.max_tool_iterations(), Some(8));
        assert_eq!(
            config.get_path("model.thinking_level"),
            Some(serde_json::json!("high"))
        );
    }

    #[test]
    fn test_thinking_for_flash_sets_budget_only() {
        let thinking = Config::default().thinking_for("gemini-2.5-flash");
        assert!(thinking.include_thoughts);
        assert_eq!(thinking.thinking_budget, Some(1024));
        assert_eq!(thinking.thinking_level, None);

        let json = serde_json::to_value(&thinking).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"includeThoughts": true, "thinkingBudget": 1024})
        );
    }

    #[test]
    fn test_thinking_for_pro_sets_level_only() {
        let thinking = Config::default().thinking_for("gemini-3-pro-preview");
        assert_eq!(thinking.thinking_budget, None);
        assert_eq!(thinking.thinking_level, Some(ThinkingLevel::Low));

        let json = serde_json::to_value(&thinking).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"includeThoughts": true, "thinkingLevel": "low"})
        );
    }

    #[test]
    fn test_thinking_for_other_model_omits_knobs() {
        let json = serde_json::to_value(ThinkingConfig::for_model(
            "gemma-3",
            1024,
            ThinkingLevel::Low,
        ))
        .unwrap();
        assert_eq!(json, serde_json::json!({"includeThoughts": true}));
    }

    #[test]
    fn test_model_resolve_api_key_prefers_direct() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_GC_API_KEY", "from-env") };
        let from_env = ModelConfig {
            api_key_env: Some("TEST_GC_API_KEY".into()),
            ..ModelConfig::default()
        };
        assert_eq!(from_env.resolve_api_key(), Some("from-env".into()));

        let direct = ModelConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_GC_API_KEY".into()),
            ..ModelConfig::default()
        };
        assert_eq!(direct.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_GC_API_KEY") };
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = Config::parse(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_zero_port_errors() {
        let config = Config {
            gateway: Some(GatewayConfig {
                port: 0,
                bind: None,
                ui: true,
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("port")),
            "Expected a port error, got: {errors:?}"
        );
    }

    #[test]
    fn test_validate_missing_workspace_warns() {
        let config = Config {
            agent: Some(AgentConfig {
                workspace: Some("/nonexistent/gemini-chat/workspace".into()),
                ..AgentConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, _errors) = config.validate();
        assert!(warnings.iter().any(|w| w.contains("Workspace")));
    }
}
