//! Provider wire formats
//!
//! Each handler is a set of pure functions: domain messages and tool
//! descriptors in, request JSON out; response JSON in, [`ModelResponse`] out.

pub mod anthropic;
pub mod openai;

use anyhow::Result;
use serde_json::Value;

use crate::ai::types::{Message, ModelResponse, Role};
use crate::tools::ToolDescriptor;

/// Request parameters shared by all formats
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions<'a> {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub system_prompt: Option<&'a str>,
    pub tools: Option<&'a [ToolDescriptor]>,
}

pub trait FormatHandler {
    /// Convert non-system messages to the provider's message list
    fn convert_messages(&self, messages: &[Message]) -> Vec<Value>;

    fn convert_tools(&self, tools: &[ToolDescriptor]) -> Vec<Value>;

    /// Assemble the request body; the system prompt goes wherever the provider expects it
    fn build_request_body(&self, model: &str, messages: Vec<Value>, options: &RequestOptions)
        -> Value;

    fn parse_response(&self, response: &Value) -> Result<ModelResponse>;
}

/// All system message text, joined, or None when there is none
pub fn system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<String> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(Message::text)
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
