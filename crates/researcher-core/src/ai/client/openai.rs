//! OpenAI Chat Completions client (and compatible servers)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{handle_error_response, ModelClient};
use crate::ai::format::openai::OpenAIFormat;
use crate::ai::format::{system_prompt, FormatHandler, RequestOptions};
use crate::ai::types::{Message, ModelResponse};
use crate::config::ModelConfig;
use crate::constants::ai;
use crate::tools::ToolDescriptor;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    format: OpenAIFormat,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: &ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: chat_completions_url(config.base_url.as_deref()),
            model: config.model_id(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            format: OpenAIFormat::new(),
        }
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json");
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }
}

/// `<base>/chat/completions`, with the default base when unset
fn chat_completions_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(ai::OPENAI_BASE_URL).trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
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
            "Calling OpenAI API"
        );

        let response = self
            .build_request()
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;
        let response = handle_error_response(response).await?;
        let json: Value = response
            .json()
            .await
            .context("OpenAI returned invalid JSON")?;

        let parsed = self.format.parse_response(&json)?;
        debug!(stop_reason = ?parsed.stop_reason, usage = ?parsed.usage, "OpenAI response");
        Ok(parsed)
    }
}
