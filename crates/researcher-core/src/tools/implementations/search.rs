//! Web search tool - Query a search provider and digest the top results

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::SearchConfig;
use crate::constants::search::{DIGEST_RESULTS, SNIPPET_MAX_CHARS};
use crate::search::{SearchDepth, SearchProvider, SearchRequest};
use crate::tools::registry::{ErrorCode, Tool};
use crate::tools::truncation::clip;
use crate::tools::{parse_params, ToolResult};

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    config: SearchConfig,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, config: SearchConfig) -> Self {
        Self { provider, config }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
    #[serde(default)]
    max_results: Option<i64>,
    #[serde(default)]
    search_depth: Option<String>,
}

/// Clip a snippet to the digest width, marking the cut
fn clip_snippet(snippet: &str) -> String {
    let snippet = snippet.trim();
    if snippet.chars().count() <= SNIPPET_MAX_CHARS {
        return snippet.to_string();
    }
    let head: String = snippet.chars().take(SNIPPET_MAX_CHARS - 3).collect();
    format!("{}...", head.trim_end())
}

fn build_digest(query: &str, results: &[Value]) -> String {
    if results.is_empty() {
        return format!("No web results found for '{}'.", query);
    }

    let mut lines = vec![format!(
        "Found {} results for '{}'. Top sources:",
        results.len(),
        query
    )];
    for result in results.iter().take(DIGEST_RESULTS) {
        let title = result
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .or_else(|| result.get("url").and_then(Value::as_str))
            .unwrap_or("Unknown source");
        let snippet = result
            .get("content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| result.get("snippet").and_then(Value::as_str))
            .unwrap_or("");
        lines.push(format!("- {}: {}", title, clip_snippet(snippet)));
    }
    lines.join("\n")
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Perform a web search. Returns a concise summary of the top findings \
         plus structured metadata with the full response. \
         Use this to gather fresh information from the internet."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query text. Should describe what information is needed."
                },
                "max_results": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": self.config.max_results_limit,
                    "default": self.config.default_max_results,
                    "description": format!(
                        "Maximum number of search results to return (1-{}, default {}).",
                        self.config.max_results_limit, self.config.default_max_results
                    )
                },
                "search_depth": {
                    "type": "string",
                    "enum": SearchDepth::ALL,
                    "default": self.config.default_depth.as_str(),
                    "description": "Search depth. Use 'basic' for faster but shallower searches, 'advanced' for deeper coverage."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let query = params.query.trim();
        if query.is_empty() {
            return ToolResult::invalid_parameters("Query must not be empty");
        }

        let max_results = match params.max_results {
            None => self.config.default_max_results,
            Some(n) if n >= 1 && n <= self.config.max_results_limit as i64 => n as u32,
            Some(_) => {
                return ToolResult::invalid_parameters(format!(
                    "max_results must be between 1 and {}",
                    self.config.max_results_limit
                ))
            }
        };

        let depth = match params.search_depth.as_deref() {
            None => self.config.default_depth,
            Some(d) => match SearchDepth::parse(d) {
                Some(depth) => depth,
                None => {
                    return ToolResult::invalid_parameters(format!(
                        "search_depth must be one of {}",
                        SearchDepth::ALL.join(", ")
                    ))
                }
            },
        };

        info!(query = %clip(query, 80), max_results, depth = depth.as_str(), "Running web search");

        let request = SearchRequest {
            query: query.to_string(),
            max_results,
            depth,
        };
        let response = match self.provider.search(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Web search failed: {:#}", e);
                return ToolResult::failure_with_code(
                    ErrorCode::ProviderError,
                    format!("Web search failed: {:#}", e),
                );
            }
        };

        let results = response
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        ToolResult::success(build_digest(query, &results))
            .with_metadata("query", query)
            .with_metadata("max_results", max_results)
            .with_metadata("search_depth", depth.as_str())
            .with_metadata("result_count", results.len())
            .with_metadata("response", response)
    }
}
