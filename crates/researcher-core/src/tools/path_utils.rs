//! Shared path validation utilities for tool implementations

use std::path::PathBuf;

use crate::tools::registry::ToolResult;
use crate::workspace::Workspace;

/// Resolve a tool-supplied path and check it against the workspace.
/// Returns the canonical path that was checked, or an access-denied ToolResult.
///
/// Every path-accepting tool calls this before touching the filesystem.
pub fn authorize(workspace: &Workspace, path: &str) -> Result<PathBuf, ToolResult> {
    if path.trim().is_empty() {
        return Err(ToolResult::invalid_parameters("filepath must not be empty"));
    }

    let canonical = workspace.canonical(path);
    if !canonical.starts_with(workspace.root()) {
        return Err(ToolResult::access_denied(path));
    }

    Ok(canonical)
}
