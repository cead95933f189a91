//! Anthropic Messages API format handler
//!
//! The system prompt is a top-level `system` parameter. Tool results travel
//! as `tool_result` blocks inside user messages, and consecutive user-side
//! turns are merged so roles strictly alternate.

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tracing::debug;

use super::{FormatHandler, RequestOptions};
use crate::ai::types::{Message, ModelResponse, Role, ToolCallRequest, Usage};
use crate::tools::ToolDescriptor;

#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicFormat;

impl AnthropicFormat {
    pub fn new() -> Self {
        Self
    }
}

/// Content blocks for one domain message
fn convert_content(msg: &Message) -> Vec<Value> {
    match msg.role {
        Role::Tool => vec![json!({
            "type": "tool_result",
            "tool_use_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.text(),
        })],
        Role::Assistant => {
            let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
            let text = msg.text();
            if !text.is_empty() {
                blocks.push(json!({ "type": "text", "text": text }));
            }
            for call in &msg.tool_calls {
                blocks.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.arguments,
                }));
            }
            if blocks.is_empty() {
                // The API rejects empty assistant content
                blocks.push(json!({ "type": "text", "text": "." }));
            }
            blocks
        }
        Role::User | Role::System => vec![json!({ "type": "text", "text": msg.text() })],
    }
}

impl FormatHandler for AnthropicFormat {
    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::new();

        for msg in messages.iter().filter(|m| m.role != Role::System) {
            let role = match msg.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            let blocks = convert_content(msg);

            let merge = result
                .last()
                .and_then(|last| last.get("role"))
                .and_then(Value::as_str)
                == Some(role);

            if merge {
                if let Some(Value::Array(existing)) =
                    result.last_mut().and_then(|last| last.get_mut("content"))
                {
                    existing.extend(blocks);
                    continue;
                }
            }

            result.push(json!({ "role": role, "content": blocks }));
        }

        debug!("Converted {} messages for Anthropic API", result.len());
        result
    }

    fn convert_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value> {
        tools.iter().map(ToolDescriptor::to_anthropic).collect()
    }

    fn build_request_body(
        &self,
        model: &str,
        messages: Vec<Value>,
        options: &RequestOptions,
    ) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": options.max_tokens,
        });

        if let Some(system) = options.system_prompt {
            body["system"] = json!(system);
        }

        if let Some(temp) = options.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(tools) = options.tools {
            if !tools.is_empty() {
                body["tools"] = json!(self.convert_tools(tools));
            }
        }

        body
    }

    fn parse_response(&self, response: &Value) -> Result<ModelResponse> {
        if response.get("type").and_then(Value::as_str) == Some("error") {
            bail!("Anthropic API error: {}", response["error"]);
        }

        let Some(blocks) = response.get("content").and_then(Value::as_array) else {
            bail!("Anthropic response missing content array");
        };

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(Value::as_str) {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let (Some(id), Some(name)) = (
                        block.get("id").and_then(Value::as_str),
                        block.get("name").and_then(Value::as_str),
                    ) else {
                        bail!("Anthropic tool_use block missing id or name");
                    };
                    tool_calls.push(ToolCallRequest {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
                    });
                }
                // Thinking and other block kinds carry nothing the loop uses
                _ => {}
            }
        }

        let usage = response.get("usage").map(|u| Usage {
            input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
        });

        Ok(ModelResponse {
            content,
            tool_calls,
            stop_reason: response
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
            usage,
        })
    }
}
