//! Anthropic Messages API client

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{handle_error_response, ModelClient};
use crate::ai::format::anthropic::AnthropicFormat;
use crate::ai::format::{system_prompt, FormatHandler, RequestOptions};
use crate::ai::types::{Message, ModelResponse};
use crate::config::ModelConfig;
use crate::constants::ai;
use crate::tools::ToolDescriptor;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    format: AnthropicFormat,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, config: &ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ai::ANTHROPIC_API_URL.to_string()),
            model: config.model_id(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            format: AnthropicFormat::new(),
        }
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        self.http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ai::ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        let system = system_prompt(messages);
        let body = self.format.build_request_body(
            &self.model,
            self.format.convert_messages(messages),
            &RequestOptions {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system_prompt: system.as_deref(),
                tools: Some(tools),
            },
        );

        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling Anthropic API"
        );

        let response = self
            .build_request()
            .json(&body)
            .send()
            .await
            .context("Anthropic request failed")?;
        let response = handle_error_response(response).await?;
        let json: Value = response
            .json()
            .await
            .context("Anthropic returned invalid JSON")?;

        let parsed = self.format.parse_response(&json)?;
        debug!(stop_reason = ?parsed.stop_reason, usage = ?parsed.usage, "Anthropic response");
        Ok(parsed)
    }
}
