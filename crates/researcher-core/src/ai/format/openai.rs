//! OpenAI Chat Completions format handler
//!
//! Also used for compatible servers reached through a custom base URL.
//! The system prompt stays in-band as the first message.

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{FormatHandler, RequestOptions};
use crate::ai::types::{Message, ModelResponse, Role, ToolCallRequest, Usage};
use crate::tools::ToolDescriptor;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAIFormat;

impl OpenAIFormat {
    pub fn new() -> Self {
        Self
    }
}

/// Tool arguments arrive as a JSON string; unparseable ones become `{}`
fn parse_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(s) if s.trim().is_empty() => json!({}),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse tool arguments {:?}: {}", s, e);
                json!({})
            }
        },
        Value::Object(_) => raw.clone(),
        _ => json!({}),
    }
}

/// Message content may be a string or a list of typed parts
fn extract_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) if part.get("type").and_then(Value::as_str) == Some("text") => {
                    part.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

impl FormatHandler for OpenAIFormat {
    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut result = Vec::with_capacity(messages.len());

        for msg in messages.iter().filter(|m| m.role != Role::System) {
            match msg.role {
                Role::Tool => result.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
                    "content": msg.text(),
                })),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    let text = msg.text();
                    let content = if text.is_empty() {
                        Value::Null
                    } else {
                        Value::String(text)
                    };
                    result.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
                }
                role => result.push(json!({
                    "role": role.as_str(),
                    "content": msg.text(),
                })),
            }
        }

        debug!("Converted {} messages for OpenAI API", result.len());
        result
    }

    fn convert_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value> {
        tools.iter().map(ToolDescriptor::to_openai).collect()
    }

    fn build_request_body(
        &self,
        model: &str,
        messages: Vec<Value>,
        options: &RequestOptions,
    ) -> Value {
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = options.system_prompt {
            all_messages.push(json!({ "role": "system", "content": system }));
        }
        all_messages.extend(messages);

        let mut body = json!({
            "model": model,
            "messages": all_messages,
            "max_tokens": options.max_tokens,
        });

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
        if let Some(error) = response.get("error") {
            bail!("OpenAI API error: {}", error);
        }

        let Some(choice) = response
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            bail!("OpenAI response has no choices");
        };
        let message = &choice["message"];

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let function = &call["function"];
                let (Some(id), Some(name)) = (
                    call.get("id").and_then(Value::as_str),
                    function.get("name").and_then(Value::as_str),
                ) else {
                    bail!("OpenAI tool call missing id or function name");
                };
                tool_calls.push(ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: parse_arguments(&function["arguments"]),
                });
            }
        }

        let usage = response.get("usage").map(|u| Usage {
            input_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: u
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        });

        Ok(ModelResponse {
            content: extract_text(&message["content"]),
            tool_calls,
            stop_reason: choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_stays_in_band_once() {
        let messages = vec![Message::system("sys"), Message::user("task")];
        let format = OpenAIFormat::new();
        let system = crate::ai::format::system_prompt(&messages);
        let body = format.build_request_body(
            "gpt-x",
            format.convert_messages(&messages),
            &RequestOptions {
                max_tokens: 50,
                temperature: Some(0.2),
                system_prompt: system.as_deref(),
                tools: None,
            },
        );
        let sent = body["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], json!({ "role": "system", "content": "sys" }));
        assert_eq!(sent[1]["role"], "user");
        assert_eq!(
            sent.iter().filter(|m| m["role"] == "system").count(),
            1
        );
    }

    #[test]
    fn test_tool_calls_use_string_arguments() {
        let call = ToolCallRequest {
            id: "call_9".to_string(),
            name: "write_file".to_string(),
            arguments: json!({ "filepath": "a.txt", "content": "x" }),
        };
        let messages = vec![
            Message::assistant("", vec![call]),
            Message::tool("call_9", "write_file", "Created a.txt"),
        ];
        let converted = OpenAIFormat::new().convert_messages(&messages);

        assert!(converted[0]["content"].is_null());
        let args = converted[0]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(args).unwrap(),
            json!({ "filepath": "a.txt", "content": "x" })
        );
        assert_eq!(converted[1]["role"], "tool");
        assert_eq!(converted[1]["tool_call_id"], "call_9");
    }

    #[test]
    fn test_parse_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        { "id": "a", "type": "function", "function": { "name": "read_file", "arguments": "{\"filepath\":\"x\"}" } },
                        { "id": "b", "type": "function", "function": { "name": "read_file", "arguments": "{not json" } }
                    ]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 4 }
        });
        let parsed = OpenAIFormat::new().parse_response(&response).unwrap();
        assert_eq!(parsed.content, "");
        assert_eq!(parsed.tool_calls[0].arguments, json!({ "filepath": "x" }));
        assert_eq!(parsed.tool_calls[1].id, "b");
        assert_eq!(parsed.tool_calls[1].arguments, json!({}));
        assert_eq!(parsed.usage.unwrap().input_tokens, 3);
        assert_eq!(parsed.stop_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_parse_without_choices_fails() {
        assert!(OpenAIFormat::new()
            .parse_response(&json!({ "choices": [] }))
            .is_err());
    }
}
