//! Tool contract and registry
//!
//! Every capability an agent can invoke implements [`Tool`]. The registry
//! owns the name-keyed mapping built once per agent and is the boundary
//! where a misbehaving tool is contained.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Machine-readable failure category stored under `metadata.error_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParameters,
    AccessDenied,
    NotFound,
    Conflict,
    AmbiguousEdit,
    Timeout,
    CommandFailed,
    UnknownTool,
    ToolPanicked,
    ProviderError,
    AgentError,
    AbnormalTermination,
    BudgetExhausted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameters => "invalid_parameters",
            Self::AccessDenied => "access_denied",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::AmbiguousEdit => "ambiguous_edit",
            Self::Timeout => "timeout",
            Self::CommandFailed => "command_failed",
            Self::UnknownTool => "unknown_tool",
            Self::ToolPanicked => "tool_panicked",
            Self::ProviderError => "provider_error",
            Self::AgentError => "agent_error",
            Self::AbnormalTermination => "abnormal_termination",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }

    fn parse(code: &str) -> Option<Self> {
        serde_json::from_value(Value::String(code.to_string())).ok()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a tool invocation, and of a whole agent run.
///
/// `error` is present exactly when `success` is false; the constructors are
/// the only way to build one, so the pairing cannot drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    success: bool,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
            metadata: Map::new(),
        }
    }

    /// Failure with empty content
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.to_string()),
            metadata: Map::new(),
        }
    }

    /// Failure tagged with an error code
    pub fn failure_with_code(code: ErrorCode, error: impl std::fmt::Display) -> Self {
        Self::failure(error).with_metadata("error_code", code.as_str())
    }

    pub fn invalid_parameters(error: impl std::fmt::Display) -> Self {
        Self::failure_with_code(ErrorCode::InvalidParameters, error)
    }

    pub fn access_denied(path: impl std::fmt::Display) -> Self {
        Self::failure_with_code(
            ErrorCode::AccessDenied,
            format!("Access denied: {} is outside workspace", path),
        )
    }

    /// Replace the content, keeping success state and metadata
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_metadata(key, value);
        self
    }

    /// Add a metadata entry. Entries are never removed once set.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.metadata
            .get("error_code")
            .and_then(Value::as_str)
            .and_then(ErrorCode::parse)
    }

    /// Text fed back to the model: content on success, `Error: <error>` on failure
    pub fn message_text(&self) -> String {
        match &self.error {
            Some(error) if !self.success => format!("Error: {}", error),
            _ => self.content.clone(),
        }
    }

    /// Summary line for display: content, or the error when content is empty
    pub fn summary(&self) -> &str {
        match &self.error {
            Some(error) if self.content.is_empty() => error,
            _ => &self.content,
        }
    }
}

/// Parse tool arguments, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    serde_json::from_value(params)
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

/// Static identity of a tool as the model sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    /// `{name, description, input_schema}`
    pub fn to_anthropic(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.parameters,
        })
    }

    /// `{type: "function", function: {name, description, parameters}}`
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A capability an agent can invoke by name.
///
/// `execute` never fails with `Err`: every internal fault is reported as a
/// failed [`ToolResult`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema: `{type: "object", properties, required}`
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> ToolResult;

    /// True for the tool whose invocation ends the agent loop
    fn completes_task(&self) -> bool {
        false
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Name-keyed set of tools, iterated in registration order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool already registered under its name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => {
                warn!(tool = %name, "Replacing already registered tool");
                self.tools[slot] = tool;
            }
            None => {
                debug!(tool = %name, "Registering tool");
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether calling `name` ends the agent loop
    pub fn is_completion(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.completes_task())
    }

    /// Execute a tool by name. Returns `None` for unknown tools.
    ///
    /// A panic inside the tool is caught here and reported as a failed result.
    pub async fn execute(&self, name: &str, args: Value) -> Option<ToolResult> {
        let tool = self.get(name)?;
        let start = Instant::now();
        debug!(tool = %name, "Executing tool");

        let result = match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %name, panic = %message, "Tool panicked");
                ToolResult::failure_with_code(
                    ErrorCode::ToolPanicked,
                    format!("Tool execution error: {}", message),
                )
            }
        };

        let duration = start.elapsed();
        if result.is_success() {
            info!(tool = %name, duration_ms = duration.as_millis() as u64, "Tool completed");
        } else {
            info!(
                tool = %name,
                duration_ms = duration.as_millis() as u64,
                error = result.error().unwrap_or_default(),
                "Tool failed"
            );
        }
        Some(result)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
