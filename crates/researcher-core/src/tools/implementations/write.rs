//! Write tool - Create, overwrite, or append to files

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::tools::path_utils::authorize;
use crate::tools::registry::{ErrorCode, Tool};
use crate::tools::{parse_params, ToolResult};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fails if the target exists
    Create,
    Overwrite,
    Append,
}

impl WriteMode {
    pub const ALL: [&'static str; 3] = ["create", "overwrite", "append"];

    fn parse(mode: &str) -> Option<Self> {
        match mode {
            "create" => Some(Self::Create),
            "overwrite" => Some(Self::Overwrite),
            "append" => Some(Self::Append),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Overwrite => "overwrite",
            Self::Append => "append",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Create => "Created",
            Self::Overwrite => "Overwrote",
            Self::Append => "Appended to",
        }
    }
}

pub struct WriteTool {
    workspace: Arc<Workspace>,
}

impl WriteTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[derive(Deserialize)]
struct Params {
    filepath: String,
    content: String,
    #[serde(default)]
    mode: Option<String>,
}

/// Newline count, plus one for a non-empty unterminated last line
fn line_count(content: &str) -> usize {
    let newlines = content.matches('\n').count();
    if !content.is_empty() && !content.ends_with('\n') {
        newlines + 1
    } else {
        newlines
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Supports three modes: \
         'create' (create new file, fail if exists), \
         'overwrite' (replace existing file or create new), \
         'append' (add to end of file or create new). \
         Missing parent directories are created. \
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
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": WriteMode::ALL,
                    "description": "Write mode: 'create' (fail if exists), 'overwrite' (replace), 'append' (add to end)",
                    "default": "create"
                }
            },
            "required": ["filepath", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let mode_name = params.mode.as_deref().unwrap_or("create");
        let Some(mode) = WriteMode::parse(mode_name) else {
            return ToolResult::invalid_parameters(format!(
                "Invalid mode: {}. Must be 'create', 'overwrite', or 'append'",
                mode_name
            ));
        };

        let path = match authorize(&self.workspace, &params.filepath) {
            Ok(p) => p,
            Err(e) => return e,
        };

        if mode == WriteMode::Create && path.exists() {
            return ToolResult::failure_with_code(
                ErrorCode::Conflict,
                format!(
                    "File already exists: {}. Use mode='overwrite' to replace it.",
                    params.filepath
                ),
            );
        }
        if path.is_dir() {
            return ToolResult::failure_with_code(
                ErrorCode::Conflict,
                format!("Path is a directory: {}", params.filepath),
            );
        }

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::failure(format!("Failed to create directory: {}", e));
            }
        }

        let written = match mode {
            WriteMode::Create | WriteMode::Overwrite => fs::write(&path, &params.content).await,
            WriteMode::Append => append(&path, &params.content).await,
        };
        if let Err(e) = written {
            return ToolResult::failure(format!("Write error: {}", e));
        }

        let file_size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) => return ToolResult::failure(format!("Write error: {}", e)),
        };

        let relative = self.workspace.display_path(&path);
        let bytes_written = params.content.len();
        let lines = line_count(&params.content);
        info!(path = %relative, mode = mode.as_str(), bytes = bytes_written, "{} file", mode.verb());

        ToolResult::success(format!(
            "{} {} ({} lines, {} bytes)",
            mode.verb(),
            relative,
            lines,
            bytes_written
        ))
        .with_metadata("filepath", path.display().to_string())
        .with_metadata("relative_path", relative)
        .with_metadata("mode", mode.as_str())
        .with_metadata("bytes_written", bytes_written)
        .with_metadata("file_size", file_size)
        .with_metadata("line_count", lines)
    }
}

async fn append(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}
