//! Complete tool - Explicitly end the agent loop with success or failure

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolResult};

pub struct CompleteTool;

#[derive(Deserialize)]
struct Params {
    success: bool,
    summary: String,
}

#[async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Mark task as completed (success or failure). \
         MUST be called when task is finished. \
         Use success=true for successful completion, \
         success=false for failures or insurmountable problems."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "success": {
                    "type": "boolean",
                    "description": "Whether the task completed successfully"
                },
                "summary": {
                    "type": "string",
                    "description": "Brief summary of what was accomplished or why it failed"
                }
            },
            "required": ["success", "summary"]
        })
    }

    fn completes_task(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let result = if params.success {
            ToolResult::success(params.summary)
        } else {
            let error = if params.summary.trim().is_empty() {
                "Task reported failure".to_string()
            } else {
                params.summary.clone()
            };
            ToolResult::failure(error).with_content(params.summary)
        };
        result.with_metadata("explicitly_completed", true)
    }
}
