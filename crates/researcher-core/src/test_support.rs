//! Test-only model client, search provider and trace sink.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::agent::{TraceEvent, TraceSink};
use crate::ai::types::{Message, ModelResponse, ToolCallRequest, Usage};
use crate::ai::ModelClient;
use crate::search::{SearchProvider, SearchRequest};
use crate::tools::ToolDescriptor;

enum Step {
    Respond(ModelResponse),
    Fail(String),
    Panic(String),
}

/// Replays a fixed script of responses, recording every request.
///
/// An exhausted script fails the call unless a repeating response was set.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Step>>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::from_steps(responses.into_iter().map(Step::Respond).collect(), None)
    }

    /// Return the same response forever
    pub fn repeating(response: ModelResponse) -> Self {
        Self::from_steps(VecDeque::new(), Some(response))
    }

    /// First call fails with a transport error
    pub fn failing(message: &str) -> Self {
        Self::from_steps(VecDeque::from([Step::Fail(message.to_string())]), None)
    }

    /// First call panics
    pub fn panicking(message: &str) -> Self {
        Self::from_steps(VecDeque::from([Step::Panic(message.to_string())]), None)
    }

    fn from_steps(script: VecDeque<Step>, repeat: Option<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(script),
            repeat,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Message history sent on each call
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        self.requests.lock().push(messages.to_vec());
        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            Some(Step::Panic(message)) => panic!("{}", message),
            None => self
                .repeat
                .clone()
                .ok_or_else(|| anyhow!("scripted client has no more responses")),
        }
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

pub fn respond(text: &str, tool_calls: Vec<ToolCallRequest>) -> ModelResponse {
    ModelResponse {
        content: text.to_string(),
        tool_calls,
        stop_reason: None,
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
    }
}

/// A reply calling only the completion tool
pub fn complete(id: &str, success: bool, summary: &str) -> ModelResponse {
    respond(
        "",
        vec![tool_call(
            id,
            "complete_task",
            json!({ "success": success, "summary": summary }),
        )],
    )
}

/// Search provider returning canned results or a fixed error
pub struct FakeSearch {
    results: Vec<Value>,
    error: Option<String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl FakeSearch {
    pub fn with_results(results: Vec<Value>) -> Self {
        Self {
            results,
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            results: Vec::new(),
            error: Some(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Value> {
        self.requests.lock().push(request.clone());
        match &self.error {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(json!({
                "query": request.query,
                "answer": null,
                "results": self.results,
            })),
        }
    }
}

/// Trace sink keeping events in memory
#[derive(Default)]
pub struct MemoryTrace {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTrace {
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

impl TraceSink for MemoryTrace {
    fn record(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}
