//! Local tools exposed to the model during a conversation.
//!
//! Each tool implements the [`Tool`] trait. The [`ToolRegistry`] advertises
//! their declarations to the model and runs the one it asks for.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use gemini_chat_core::types::ToolValue;
use gemini_chat_providers::ToolDefinition;

pub mod fibonacci;
pub mod find_files;
pub mod list_files;
pub mod path_guard;

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Relative paths resolve against this directory.
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

impl ToolContext {
    pub fn new(workspace: impl Into<PathBuf>, restrict_to_workspace: bool) -> Self {
        Self {
            workspace: workspace.into(),
            restrict_to_workspace,
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Path '{path}' is outside the workspace '{workspace}'")]
    OutsideWorkspace { path: String, workspace: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The core tool trait. Every built-in tool implements this.
pub trait Tool: Send + Sync {
    /// Tool name as declared to the model (e.g., "listFiles").
    fn name(&self) -> &str;

    /// Human-readable description for the model.
    fn description(&self) -> &str;

    /// Parameter schema in the Gemini function-declaration dialect.
    fn parameters_schema(&self) -> Value;

    fn execute(&self, args: &Map<String, Value>, context: &ToolContext)
    -> Result<ToolValue, ToolError>;
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Arc::from(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Function declarations for the model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Run a tool by name. Returns `None` when no such tool is registered.
    ///
    /// Tools do blocking filesystem work, so they run on the blocking pool.
    /// Failures, panics included, come back as an error-describing text
    /// result so the model can see what went wrong.
    pub async fn invoke(
        &self,
        name: &str,
        args: &Map<String, Value>,
        context: &ToolContext,
    ) -> Option<ToolValue> {
        let tool = self.tools.iter().find(|t| t.name() == name).cloned()?;
        info!(tool = %name, "Executing tool");

        let args = args.clone();
        let context = context.clone();
        let joined = tokio::task::spawn_blocking(move || tool.execute(&args, &context)).await;
        let value = match joined {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool failed");
                ToolValue::Text(format!("Error executing {name}: {e}"))
            }
            Err(e) if e.is_panic() => {
                let panic = e.into_panic();
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                warn!(tool = %name, %reason, "Tool panicked");
                ToolValue::Text(format!("Error executing {name}: {reason}"))
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool task did not complete");
                ToolValue::Text(format!("Error executing {name}: {e}"))
            }
        };
        Some(value)
    }
}

/// Register the built-in tools.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Box::new(fibonacci::FibonacciTool));
    registry.register(Box::new(list_files::ListFilesTool));
    registry.register(Box::new(find_files::FindFilesTool));
}

/// Registry holding every built-in tool.
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry);
    registry
}

/// Optional string argument.
pub(crate) fn str_arg<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(ToolError::InvalidArgument(format!(
            "argument '{key}' must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    struct Panicky;

    impl Tool for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn description(&self) -> &str {
            "Always panics."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "OBJECT", "properties": {}})
        }
        fn execute(&self, _: &Map<String, Value>, _: &ToolContext) -> Result<ToolValue, ToolError> {
            panic!("boom")
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_builtin_names() {
        let registry = builtin_registry();
        assert_eq!(registry.list(), vec!["fibonacci", "listFiles", "findFiles"]);
        assert!(registry.get("fibonacci").is_some());
        assert!(registry.get("deleteEverything").is_none());
    }

    #[test]
    fn test_definitions_are_sent_verbatim() {
        let defs = builtin_registry().definitions();
        let find = defs.iter().find(|d| d.name == "findFiles").unwrap();
        assert_eq!(find.parameters_schema["type"], "OBJECT");
        assert_eq!(find.parameters_schema["required"], json!(["pattern"]));
        assert_eq!(
            find.parameters_schema["properties"]["type"]["enum"],
            json!(["file", "directory", "all"])
        );
        let list = defs.iter().find(|d| d.name == "listFiles").unwrap();
        assert_eq!(list.parameters_schema["required"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_none() {
        let ctx = ToolContext::new(".", false);
        assert!(builtin_registry().invoke("nope", &Map::new(), &ctx).await.is_none());
    }

    #[tokio::test]
    async fn test_failure_becomes_error_text() {
        let ctx = ToolContext::new(".", false);
        let value = builtin_registry()
            .invoke("fibonacci", &args(json!({"n": -1})), &ctx)
            .await
            .unwrap();
        match value {
            ToolValue::Text(text) => assert!(text.starts_with("Error executing fibonacci:")),
            other => panic!("expected error text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_error_text() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Panicky));
        let ctx = ToolContext::new(".", false);
        let value = registry.invoke("panicky", &Map::new(), &ctx).await.unwrap();
        assert_eq!(value, ToolValue::Text("Error executing panicky: boom".into()));
    }

    /// Blocks until the async side signals, so it only finishes if the
    /// runtime thread stays free while the tool runs.
    struct Gate {
        opened: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl Tool for Gate {
        fn name(&self) -> &str {
            "gate"
        }
        fn description(&self) -> &str {
            "Waits for a signal."
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "OBJECT", "properties": {}})
        }
        fn execute(&self, _: &Map<String, Value>, _: &ToolContext) -> Result<ToolValue, ToolError> {
            let opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
            opened
                .recv_timeout(Duration::from_secs(5))
                .map(|()| ToolValue::from("opened"))
                .map_err(|e| ToolError::InvalidArgument(e.to_string()))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_tool_leaves_runtime_free() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Gate {
            opened: Mutex::new(rx),
        }));

        let signal = tokio::spawn(async move {
            tx.send(()).unwrap();
        });
        let ctx = ToolContext::new(".", false);
        let value = registry.invoke("gate", &Map::new(), &ctx).await.unwrap();

        assert_eq!(value, ToolValue::from("opened"));
        signal.await.unwrap();
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = builtin_registry();
        registry.register(Box::new(fibonacci::FibonacciTool));
        assert_eq!(registry.list().len(), 3);
    }
}
