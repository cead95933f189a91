//! Model client contract, wire formats, and provider clients

pub mod client;
pub mod format;
pub mod types;

pub use client::{build_client, AnthropicClient, ModelClient, OpenAiClient};
pub use types::{Content, ContentBlock, Message, ModelResponse, Role, ToolCallRequest, Usage};
