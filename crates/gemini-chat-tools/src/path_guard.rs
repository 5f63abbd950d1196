//! Path checks shared by the filesystem tools.

use std::path::{Path, PathBuf};

use crate::ToolError;

/// True if the raw argument contains the parent-directory token.
///
/// This is a textual check on purpose: it runs before any filesystem access.
pub fn has_traversal(raw: &str) -> bool {
    raw.contains("..")
}

/// Resolve a path argument against the workspace. With `restrict` set, the
/// result must stay inside the workspace.
pub fn validate_path(raw: &str, workspace: &Path, restrict: bool) -> Result<PathBuf, ToolError> {
    let path = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        workspace.join(raw)
    };

    if restrict {
        let workspace_canon = workspace
            .canonicalize()
            .unwrap_or_else(|_| workspace.to_path_buf());
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !canonical.starts_with(&workspace_canon) {
            return Err(ToolError::OutsideWorkspace {
                path: canonical.display().to_string(),
                workspace: workspace_canon.display().to_string(),
            });
        }
    }

    Ok(path)
}
