//! Web search provider
//!
//! The search tool talks to a [`SearchProvider`]; [`TavilyClient`] is the
//! HTTP implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::constants::search;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl SearchDepth {
    pub const ALL: [&'static str; 2] = ["basic", "advanced"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Advanced => "advanced",
        }
    }

    pub fn parse(depth: &str) -> Option<Self> {
        match depth {
            "basic" => Some(Self::Basic),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub depth: SearchDepth,
}

/// Source of web search results. Returns the provider's raw JSON response,
/// which must carry a `results` array of `{title, url, content}` objects.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Value>;
}

/// Tavily search API client
pub struct TavilyClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            api_url: search::TAVILY_API_URL.to_string(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        let body = json!({
            "api_key": self.api_key,
            "query": request.query,
            "max_results": request.max_results,
            "search_depth": request.depth.as_str(),
            "include_answer": true,
        });

        debug!(query = %request.query, "Sending Tavily search request");
        let response = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .context("Tavily request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Tavily API error {}: {}", status, text);
        }

        response
            .json::<Value>()
            .await
            .context("Tavily returned invalid JSON")
    }
}

impl std::fmt::Debug for TavilyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}
