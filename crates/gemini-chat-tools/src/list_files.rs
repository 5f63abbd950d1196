//! Directory listing tool.

use serde_json::{Map, Value, json};

use gemini_chat_core::types::ToolValue;

use crate::path_guard::{has_traversal, validate_path};
use crate::{Tool, ToolContext, ToolError, str_arg};

pub struct ListFilesTool;

impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "listFiles"
    }

    fn description(&self) -> &str {
        "Lists files and directories in the current directory or a subdirectory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "path": {
                    "type": "STRING",
                    "description": "The relative path to list files from (default is current directory '.')."
                }
            },
            "required": []
        })
    }

    fn execute(&self, args: &Map<String, Value>, context: &ToolContext) -> Result<ToolValue, ToolError> {
        let raw_path = str_arg(args, "path")?.filter(|p| !p.is_empty()).unwrap_or(".");

        if has_traversal(raw_path) {
            return Ok("Error: Access to parent directories is restricted.".into());
        }

        let dir = match validate_path(raw_path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error listing files: {e}").into()),
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => return Ok(format!("Error listing files: {e}").into()),
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        Ok(names.join("\n").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context(workspace: &std::path::Path) -> ToolContext {
        ToolContext::new(workspace, false)
    }

    fn run(args: Value, ctx: &ToolContext) -> String {
        ListFilesTool
            .execute(args.as_object().unwrap(), ctx)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_lists_workspace_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::write(ws.join("readme.md"), "hello").unwrap();
        std::fs::write(ws.join("Cargo.toml"), "").unwrap();
        std::fs::create_dir(ws.join("src")).unwrap();

        let out = run(json!({}), &test_context(ws));
        assert_eq!(out, "Cargo.toml\nreadme.md\nsrc");
    }

    #[test]
    fn test_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::create_dir_all(ws.join("src/nested")).unwrap();
        std::fs::write(ws.join("src/main.rs"), "").unwrap();

        let out = run(json!({"path": "src"}), &test_context(ws));
        assert_eq!(out, "main.rs\nnested");
    }

    #[test]
    fn test_parent_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(json!({"path": "../"}), &test_context(dir.path()));
        assert_eq!(out, "Error: Access to parent directories is restricted.");
    }

    #[test]
    fn test_missing_directory_is_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(json!({"path": "nope"}), &test_context(dir.path()));
        assert!(out.starts_with("Error listing files:"));
    }

    #[test]
    fn test_workspace_restriction() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), true);
        let out = run(json!({"path": other.path().to_string_lossy()}), &ctx);
        assert!(out.starts_with("Error listing files:"));
        assert!(out.contains("outside the workspace"));
    }
}
