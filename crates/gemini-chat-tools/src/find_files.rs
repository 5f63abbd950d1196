//! Recursive name search over the workspace.

use std::path::Path;

use glob::Pattern;
use serde_json::{Map, Value, json};
use tracing::trace;
use walkdir::WalkDir;

use gemini_chat_core::types::ToolValue;

use crate::path_guard::{has_traversal, validate_path};
use crate::{Tool, ToolContext, ToolError, str_arg};

/// Matches returned per call.
pub const MAX_RESULTS: usize = 20;

const REJECTED: &str = "Error: Invalid characters or path traversal detected.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryType {
    File,
    Directory,
    All,
}

impl EntryType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "file" => Some(Self::File),
            "directory" => Some(Self::Directory),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn accepts(self, file_type: std::fs::FileType) -> bool {
        match self {
            Self::File => file_type.is_file(),
            Self::Directory => file_type.is_dir(),
            Self::All => true,
        }
    }
}

pub struct FindFilesTool;

impl Tool for FindFilesTool {
    fn name(&self) -> &str {
        "findFiles"
    }

    fn description(&self) -> &str {
        "Searches for files or directories matching a pattern recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "pattern": {
                    "type": "STRING",
                    "description": "The glob pattern or filename to search for (e.g., '*.js', 'server.js')."
                },
                "searchPath": {
                    "type": "STRING",
                    "description": "The directory to start searching from (default is '.')."
                },
                "type": {
                    "type": "STRING",
                    "description": "The type of item to search for. Can be 'file', 'directory', or 'all'. Default is 'all'.",
                    "enum": ["file", "directory", "all"]
                }
            },
            "required": ["pattern"]
        })
    }

    fn execute(&self, args: &Map<String, Value>, context: &ToolContext) -> Result<ToolValue, ToolError> {
        let pattern = str_arg(args, "pattern")?
            .ok_or_else(|| ToolError::InvalidArgument("missing required argument 'pattern'".into()))?;
        let search_path = str_arg(args, "searchPath")?.filter(|p| !p.is_empty()).unwrap_or(".");
        let entry_type = str_arg(args, "type")?.filter(|t| !t.is_empty()).unwrap_or("all");

        if has_traversal(search_path)
            || has_traversal(pattern)
            || pattern.contains(['|', ';', '&'])
        {
            return Ok(REJECTED.into());
        }

        let Some(entry_type) = EntryType::parse(entry_type) else {
            return Ok(format!(
                "Error finding files: unknown type '{entry_type}' (expected file, directory or all)"
            )
            .into());
        };

        let matcher = match Pattern::new(pattern) {
            Ok(m) => m,
            Err(e) => return Ok(format!("Error finding files: invalid pattern: {e}").into()),
        };

        let root = match validate_path(search_path, &context.workspace, context.restrict_to_workspace) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error finding files: {e}").into()),
        };
        if let Err(e) = std::fs::metadata(&root) {
            return Ok(format!("Error finding files: {e}").into());
        }

        let matches = search(&root, Path::new(search_path), &matcher, entry_type);
        if matches.is_empty() {
            return Ok("No matches found.".into());
        }
        Ok(matches.join("\n").into())
    }
}

/// Walk `root`, reporting matches relative to `shown_root`.
fn search(root: &Path, shown_root: &Path, matcher: &Pattern, entry_type: EntryType) -> Vec<String> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                trace!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry_type.accepts(entry.file_type()))
        .filter(|entry| matcher.matches(&entry.file_name().to_string_lossy()))
        .take(MAX_RESULTS)
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            shown_root.join(relative).display().to_string()
        })
        .collect()
}
