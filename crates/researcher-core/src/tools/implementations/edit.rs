//! Edit tool - Replace a unique exact string in a file

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::TextDiff;
use tokio::fs;
use tracing::info;

use crate::tools::path_utils::authorize;
use crate::tools::registry::{ErrorCode, Tool};
use crate::tools::truncation::clip;
use crate::tools::{parse_params, ToolResult};
use crate::workspace::Workspace;

pub struct EditTool {
    workspace: Arc<Workspace>,
}

impl EditTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct Params {
    filepath: String,
    old_string: String,
    new_string: String,
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing text. The old_string must match exactly and \
         must appear exactly once in the file (to prevent accidental replacements). \
         File paths can be relative to workspace or absolute (must be within workspace)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filepath": {
                    "type": "string",
                    "description": "Path to the file (relative to workspace or absolute)"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find and replace (must be unique in file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "Text to replace old_string with"
                }
            },
            "required": ["filepath", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if params.old_string.is_empty() {
            return ToolResult::invalid_parameters("old_string must not be empty");
        }

        let path = match authorize(&self.workspace, &params.filepath) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if !path.exists() {
            return ToolResult::failure_with_code(
                ErrorCode::NotFound,
                format!("File not found: {}", params.filepath),
            );
        }
        if !path.is_file() {
            return ToolResult::failure_with_code(
                ErrorCode::InvalidParameters,
                format!("Not a file: {}", params.filepath),
            );
        }

        let content = match fs::read(&path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    return ToolResult::failure_with_code(
                        ErrorCode::InvalidParameters,
                        format!(
                            "Cannot edit {}: file is not valid UTF-8 text",
                            params.filepath
                        ),
                    )
                }
            },
            Err(e) => return ToolResult::failure(format!("Edit error: {}", e)),
        };

        let occurrences = content.matches(&params.old_string).count();
        match occurrences {
            0 => {
                return ToolResult::failure_with_code(
                    ErrorCode::NotFound,
                    format!(
                        "old_string not found in file: {}",
                        clip(&params.old_string, 100)
                    ),
                )
            }
            1 => {}
            n => {
                return ToolResult::failure_with_code(
                    ErrorCode::AmbiguousEdit,
                    format!(
                        "old_string appears {} times in file. \
                         It must be unique to prevent accidental replacements.",
                        n
                    ),
                )
            }
        }

        let new_content = content.replacen(&params.old_string, &params.new_string, 1);
        let relative = self.workspace.display_path(&path);
        let diff = generate_compact_diff(&content, &new_content, &relative);

        if let Err(e) = fs::write(&path, &new_content).await {
            return ToolResult::failure(format!("Edit error: {}", e));
        }

        info!(path = %relative, "Edited file");

        let size_change = new_content.len() as i64 - content.len() as i64;
        let mut result = ToolResult::success(format!("Edited {}: replaced 1 occurrence", relative))
            .with_metadata("filepath", path.display().to_string())
            .with_metadata("relative_path", relative)
            .with_metadata("old_length", params.old_string.len())
            .with_metadata("new_length", params.new_string.len())
            .with_metadata("size_change", size_change);
        if !diff.is_empty() {
            result.insert_metadata("diff", diff);
        }
        result
    }
}

/// Generate a compact unified diff
fn generate_compact_diff(old: &str, new: &str, label: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        output.push_str(&format!("{}", hunk));
    }
    if output.is_empty() {
        return String::new();
    }
    format!("--- {}\n+++ {}\n{}", label, label, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::{ReadTool, WriteTool};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Workspace>, EditTool) {
        let dir = TempDir::new().unwrap();
        let ws = Arc::new(Workspace::open(dir.path()).unwrap());
        let tool = EditTool::new(Arc::clone(&ws));
        (dir, ws, tool)
    }

    fn edit_args(old: &str, new: &str) -> Value {
        json!({ "filepath": "f.txt", "old_string": old, "new_string": new })
    }

    #[tokio::test]
    async fn test_edit_succeeds_only_for_unique_match() {
        let (_dir, ws, tool) = setup();
        let file = ws.root().join("f.txt");

        std::fs::write(&file, "cat cat").unwrap();
        let twice = tool.execute(edit_args("cat", "dog")).await;
        assert!(!twice.is_success());
        assert_eq!(twice.error_code(), Some(ErrorCode::AmbiguousEdit));
        assert!(twice.error().unwrap().contains('2'));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "cat cat");

        std::fs::write(&file, "a cat sat").unwrap();
        let once = tool.execute(edit_args("cat", "dog")).await;
        assert!(once.is_success());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "a dog sat");
        let diff = once.metadata_value("diff").and_then(Value::as_str).unwrap();
        assert!(diff.contains("-a cat sat"));
        assert!(diff.contains("+a dog sat"));

        let none = tool.execute(edit_args("cat", "dog")).await;
        assert_eq!(none.error_code(), Some(ErrorCode::NotFound));
        assert!(none.error().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_empty_old_string_rejected() {
        let (_dir, ws, tool) = setup();
        std::fs::write(ws.root().join("f.txt"), "text").unwrap();
        let result = tool.execute(edit_args("", "x")).await;
        assert_eq!(result.error_code(), Some(ErrorCode::InvalidParameters));
    }

    #[tokio::test]
    async fn test_edit_outside_workspace_denied() {
        let (_dir, _ws, tool) = setup();
        let result = tool
            .execute(json!({ "filepath": "/etc/hosts", "old_string": "a", "new_string": "b" }))
            .await;
        assert_eq!(result.error_code(), Some(ErrorCode::AccessDenied));
    }

    #[tokio::test]
    async fn test_write_edit_read_scenario() {
        let (_dir, ws, edit) = setup();
        let write = WriteTool::new(Arc::clone(&ws));
        let read = ReadTool::new(Arc::clone(&ws));

        let created = write
            .execute(json!({ "filepath": "notes.txt", "content": "Hello", "mode": "create" }))
            .await;
        assert!(created.is_success());
        assert_eq!(
            std::fs::read_to_string(ws.root().join("notes.txt")).unwrap(),
            "Hello"
        );

        let edited = edit
            .execute(json!({ "filepath": "notes.txt", "old_string": "Hello", "new_string": "Goodbye" }))
            .await;
        assert!(edited.is_success());

        let content = read.execute(json!({ "filepath": "notes.txt" })).await;
        assert!(content.is_success());
        assert!(content.content().contains("Goodbye"));
        assert!(!content.content().contains("Hello"));

        let again = edit
            .execute(json!({ "filepath": "notes.txt", "old_string": "Hello", "new_string": "X" }))
            .await;
        assert!(!again.is_success());
        assert!(again.error().unwrap().contains("not found"));
    }
}
