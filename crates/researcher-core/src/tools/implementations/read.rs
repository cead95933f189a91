//! Read tool - Read file contents with line numbers

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::info;

use crate::tools::path_utils::authorize;
use crate::tools::registry::{ErrorCode, Tool};
use crate::tools::{parse_params, ToolResult};
use crate::workspace::Workspace;

pub struct ReadTool {
    workspace: Arc<Workspace>,
}

impl ReadTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct Params {
    filepath: String,
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    end_line: Option<usize>,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Supports reading the full file or a specific line range. \
         Returns content with line numbers for easy reference. \
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
                "start_line": {
                    "type": "integer",
                    "description": "Starting line number (1-indexed, optional)",
                    "minimum": 1
                },
                "end_line": {
                    "type": "integer",
                    "description": "Ending line number (1-indexed, optional, inclusive)",
                    "minimum": 1
                }
            },
            "required": ["filepath"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

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

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => return ToolResult::failure(format!("Read error: {}", e)),
        };

        // NUL bytes mean binary even when the bytes happen to be valid UTF-8
        let text = match String::from_utf8(bytes) {
            Ok(s) if !s.contains('\0') => s,
            _ => {
                return ToolResult::failure_with_code(
                    ErrorCode::InvalidParameters,
                    format!(
                        "Cannot read {}: file is not valid UTF-8 text",
                        params.filepath
                    ),
                )
            }
        };

        let lines: Vec<&str> = text.lines().collect();
        let total_lines = lines.len();

        let (start_idx, end_idx) = if params.start_line.is_some() || params.end_line.is_some() {
            let start_idx = params.start_line.unwrap_or(1).saturating_sub(1);
            if params.start_line == Some(0) || start_idx >= total_lines {
                return ToolResult::invalid_parameters(format!(
                    "start_line {} out of range (file has {} lines)",
                    params.start_line.unwrap_or(1),
                    total_lines
                ));
            }

            let end_idx = params.end_line.unwrap_or(total_lines);
            if end_idx <= start_idx || end_idx > total_lines {
                return ToolResult::invalid_parameters(format!(
                    "end_line {} invalid (must be >= start_line and <= {})",
                    end_idx, total_lines
                ));
            }
            (start_idx, end_idx)
        } else {
            (0, total_lines)
        };

        let selected = &lines[start_idx..end_idx];
        let content = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:6}\u{2192}{}", start_idx + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        let relative = self.workspace.display_path(&path);
        info!(path = %relative, lines = selected.len(), "Read file");

        let first_line = start_idx + 1;
        ToolResult::success(content)
            .with_metadata("filepath", path.display().to_string())
            .with_metadata("relative_path", relative)
            .with_metadata("total_lines", total_lines)
            .with_metadata("lines_read", selected.len())
            .with_metadata("start_line", first_line)
            .with_metadata("end_line", (first_line + selected.len()).saturating_sub(1))
    }
}
