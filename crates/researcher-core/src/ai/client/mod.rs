//! Model client contract and provider clients

mod anthropic;
mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::ai::types::{Message, ModelResponse};
use crate::config::{ModelConfig, Provider};
use crate::tools::ToolDescriptor;

/// Obtains a structured response from a language model.
///
/// Transport and API failures are returned as `Err`; an implementation
/// must never paper over them with an empty response.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model id, for instrumentation
    fn model(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse>;
}

/// Build the client selected by config
pub fn build_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>> {
    let client: Arc<dyn ModelClient> = match config.provider {
        Provider::Anthropic => {
            let api_key = config.api_key.clone().context(
                "Anthropic API key required. Set ANTHROPIC_API_KEY or [model].api_key",
            )?;
            Arc::new(AnthropicClient::new(api_key, config))
        }
        Provider::OpenAI => {
            // Local compatible servers often need no key
            let api_key = config.api_key.clone().unwrap_or_default();
            Arc::new(OpenAiClient::new(api_key, config))
        }
    };
    tracing::info!(provider = %config.provider, model = client.model(), "Model client ready");
    Ok(client)
}

/// Turn a non-2xx response into an error carrying status and body
async fn handle_error_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("API error {}: {}", status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anthropic_requires_key() {
        let config = ModelConfig::default();
        assert!(build_client(&config).is_err());

        let config = ModelConfig {
            api_key: Some("sk-ant-test".to_string()),
            ..ModelConfig::default()
        };
        let client = build_client(&config).unwrap();
        assert_eq!(client.model(), crate::constants::ai::DEFAULT_ANTHROPIC_MODEL);
    }

    #[test]
    fn test_openai_without_key_is_allowed() {
        let config = ModelConfig {
            provider: Provider::OpenAI,
            model: Some("local".to_string()),
            ..ModelConfig::default()
        };
        assert_eq!(build_client(&config).unwrap().model(), "local");
    }
}
