//! The agent execution loop
//!
//! One model call per step, then the requested tool calls one at a time in
//! the order the model listed them. A run ends in exactly one way:
//! - the completion tool was called (success or failure per its own flag)
//! - the model replied without any tool call (abnormal termination)
//! - the step budget ran out
//!
//! Model transport failures and history corruption are caught once, at the
//! top of `run`, and reported as a failed result.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::conversation::Conversation;
use super::trace::{TraceEvent, TraceSink};
use crate::ai::types::{Message, ToolCallRequest};
use crate::ai::ModelClient;
use crate::constants::agent::{ASSISTANT_MAX_STEPS, MAX_TOOL_MESSAGE_CHARS};
use crate::tools::truncation::{clip, truncate_chars};
use crate::tools::{ErrorCode, ToolRegistry, ToolResult};
use crate::workspace::Workspace;

const SKIPPED_AFTER_COMPLETION: &str = "Error: Not executed because the task was already completed";

pub struct Agent {
    agent_type: String,
    parent: Option<String>,
    client: Arc<dyn ModelClient>,
    registry: ToolRegistry,
    workspace: Arc<Workspace>,
    conversation: Conversation,
    max_steps: usize,
    step_count: usize,
    output_files: Vec<String>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Agent {
    pub fn new(
        agent_type: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<dyn ModelClient>,
        registry: ToolRegistry,
        workspace: Arc<Workspace>,
    ) -> Self {
        let agent_type = agent_type.into();
        info!(
            agent = %agent_type,
            tools = registry.len(),
            workspace = %workspace,
            "Initialized agent"
        );
        Self {
            agent_type,
            parent: None,
            client,
            registry,
            workspace,
            conversation: Conversation::new(system_prompt),
            max_steps: ASSISTANT_MAX_STEPS,
            step_count: 0,
            output_files: Vec::new(),
            trace: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_trace(mut self, trace: Option<Arc<dyn TraceSink>>) -> Self {
        self.trace = trace;
        self
    }

    /// Name of the delegating agent, recorded in trace events
    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Steps taken by the current (or last) run
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Files reported by successful tool results, first-seen order
    pub fn output_files(&self) -> &[String] {
        &self.output_files
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Truncate history back to the system prompt. Output files are kept.
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.step_count = 0;
        info!(agent = %self.agent_type, "Agent reset");
    }

    /// Run a task to a terminal result. Never panics on model or tool failure.
    pub async fn run(&mut self, task: &str) -> ToolResult {
        info!(agent = %self.agent_type, task = %clip(task, 100), "Starting task");
        self.emit(TraceEvent::AgentStart {
            agent_type: self.agent_type.clone(),
            task: task.to_string(),
            parent_agent: self.parent.clone(),
        });
        self.step_count = 0;

        let result = match self.drive(task).await {
            Ok(result) => result,
            Err(e) => {
                error!(agent = %self.agent_type, step = self.step_count, "Agent error: {:#}", e);
                ToolResult::failure_with_code(
                    ErrorCode::AgentError,
                    format!("Agent execution error: {:#}", e),
                )
            }
        };
        let result = self.with_loop_metadata(result);

        self.emit(TraceEvent::AgentComplete {
            agent_type: self.agent_type.clone(),
            success: result.is_success(),
            summary: result.summary().to_string(),
            steps_used: self.step_count,
        });
        result
    }

    async fn drive(&mut self, task: &str) -> Result<ToolResult> {
        self.conversation.push(Message::user(task))?;
        let descriptors = self.registry.descriptors();

        while self.step_count < self.max_steps {
            self.step_count += 1;
            let step = self.step_count;
            debug!(agent = %self.agent_type, step, max_steps = self.max_steps, "Step");

            let mut response = self
                .client
                .generate(self.conversation.messages(), &descriptors)
                .await?;
            assign_unique_call_ids(&mut response.tool_calls, step);

            let usage = response.usage.unwrap_or_default();
            self.emit(TraceEvent::LlmCall {
                agent_type: self.agent_type.clone(),
                model: self.client.model().to_string(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            });

            self.conversation.push(Message::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ))?;
            if !response.content.is_empty() {
                info!(agent = %self.agent_type, step, "Assistant: {}", clip(&response.content, 200));
            }

            if !response.has_tool_calls() {
                warn!(
                    agent = %self.agent_type,
                    step,
                    "Agent stopped without calling the completion tool"
                );
                return Ok(ToolResult::failure_with_code(
                    ErrorCode::AbnormalTermination,
                    "Agent did not explicitly complete the task (missing complete_task call)",
                )
                .with_content(response.content)
                .with_metadata("abnormal_termination", true));
            }

            let mut calls = response.tool_calls.into_iter();
            while let Some(call) = calls.next() {
                let completes = self.registry.is_completion(&call.name);
                let result = self.dispatch(&call).await;

                let text = truncate_chars(&result.message_text(), MAX_TOOL_MESSAGE_CHARS);
                self.conversation
                    .push(Message::tool(&call.id, &call.name, text.into_marked()))?;

                if completes {
                    let skipped: Vec<ToolCallRequest> = calls.collect();
                    if !skipped.is_empty() {
                        warn!(
                            agent = %self.agent_type,
                            discarded = skipped.len(),
                            "Discarding tool calls listed after completion"
                        );
                    }
                    for call in skipped {
                        self.conversation.push(Message::tool(
                            &call.id,
                            &call.name,
                            SKIPPED_AFTER_COMPLETION,
                        ))?;
                    }
                    info!(
                        agent = %self.agent_type,
                        success = result.is_success(),
                        steps = step,
                        "Task explicitly completed"
                    );
                    return Ok(result);
                }
            }
        }

        warn!(agent = %self.agent_type, max_steps = self.max_steps, "Max steps reached");
        Ok(ToolResult::failure_with_code(
            ErrorCode::BudgetExhausted,
            format!("Max steps ({}) reached without completion", self.max_steps),
        )
        .with_metadata("budget_exhausted", true))
    }

    /// Execute one call. Unknown tools fail here without touching any tool.
    async fn dispatch(&mut self, call: &ToolCallRequest) -> ToolResult {
        info!(agent = %self.agent_type, tool = %call.name, "Calling tool");
        self.emit(TraceEvent::ToolCall {
            agent_type: self.agent_type.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            parent_agent: self.parent.clone(),
        });

        let result = match self.registry.execute(&call.name, call.arguments.clone()).await {
            Some(result) => result,
            None => {
                error!(agent = %self.agent_type, tool = %call.name, "Unknown tool");
                ToolResult::failure_with_code(
                    ErrorCode::UnknownTool,
                    format!("Unknown tool: {}", call.name),
                )
            }
        };

        if result.is_success() {
            if let Some(path) = result.metadata_value("filepath").and_then(Value::as_str) {
                if !self.output_files.iter().any(|p| p == path) {
                    self.output_files.push(path.to_string());
                }
            }
            debug!(agent = %self.agent_type, tool = %call.name, "Tool result: {}", clip(result.content(), 200));
        } else {
            warn!(
                agent = %self.agent_type,
                tool = %call.name,
                "Tool error: {}",
                result.error().unwrap_or_default()
            );
        }

        self.emit(TraceEvent::ToolResult {
            agent_type: self.agent_type.clone(),
            tool_name: call.name.clone(),
            success: result.is_success(),
            content: result.message_text(),
            parent_agent: self.parent.clone(),
        });
        result
    }

    fn with_loop_metadata(&self, result: ToolResult) -> ToolResult {
        result
            .with_metadata("agent_type", self.agent_type.as_str())
            .with_metadata("steps_used", self.step_count)
            .with_metadata("output_files", self.output_files.clone())
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(trace) = &self.trace {
            trace.record(event);
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("agent_type", &self.agent_type)
            .field("parent", &self.parent)
            .field("model", &self.client.model())
            .field("tools", &self.registry.names())
            .field("max_steps", &self.max_steps)
            .field("step_count", &self.step_count)
            .finish()
    }
}

/// Replace empty or repeated call ids with local ones, so each tool message
/// answers exactly one call of the turn
fn assign_unique_call_ids(calls: &mut [ToolCallRequest], step: usize) {
    let mut seen = HashSet::new();
    for (index, call) in calls.iter_mut().enumerate() {
        if !call.id.is_empty() && seen.insert(call.id.clone()) {
            continue;
        }
        let mut local = format!("call_{}_{}", step, index);
        while seen.contains(&local) {
            local.push('_');
        }
        debug!(tool = %call.name, original = %call.id, local = %local, "Reassigned tool call id");
        seen.insert(local.clone());
        call.id = local;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{complete, respond, tool_call, MemoryTrace, ScriptedClient};
    use crate::tools::implementations::{CompleteTool, ReadTool, WriteTool};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        workspace: Arc<Workspace>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let workspace = Arc::new(Workspace::open(dir.path()).unwrap());
        Fixture {
            _dir: dir,
            workspace,
        }
    }

    fn agent(fx: &Fixture, client: Arc<ScriptedClient>) -> Agent {
        let registry = ToolRegistry::new()
            .with(Arc::new(ReadTool::new(Arc::clone(&fx.workspace))))
            .with(Arc::new(WriteTool::new(Arc::clone(&fx.workspace))))
            .with(Arc::new(CompleteTool));
        Agent::new("writer", "You write.", client, registry, Arc::clone(&fx.workspace))
    }

    fn write_call(id: &str, path: &str) -> ToolCallRequest {
        tool_call(
            id,
            "write_file",
            json!({ "filepath": path, "content": "Hello", "mode": "overwrite" }),
        )
    }

    #[tokio::test]
    async fn test_explicit_completion_carries_loop_metadata() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![
            respond("Writing", vec![write_call("t1", "notes.txt")]),
            complete("t2", true, "Wrote the notes"),
        ]));
        let mut agent = agent(&fx, Arc::clone(&client));

        let result = agent.run("Write notes").await;

        assert!(result.is_success());
        assert_eq!(result.content(), "Wrote the notes");
        assert_eq!(result.metadata_value("agent_type"), Some(&json!("writer")));
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(2)));
        let expected = fx.workspace.resolve("notes.txt").display().to_string();
        assert_eq!(result.metadata_value("output_files"), Some(&json!([expected])));
        assert_eq!(result.metadata_value("explicitly_completed"), Some(&json!(true)));
        assert!(result.metadata_value("abnormal_termination").is_none());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_completion_with_failure_flag_is_a_failed_result() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![complete("t1", false, "Sources unavailable")]));
        let result = agent(&fx, client).run("Research").await;

        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Sources unavailable"));
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(1)));
        assert!(result.metadata_value("budget_exhausted").is_none());
    }

    #[tokio::test]
    async fn test_reply_without_tool_calls_is_abnormal_termination() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![respond("I am done, I think.", vec![])]));
        let result = agent(&fx, Arc::clone(&client)).run("Research").await;

        assert!(!result.is_success());
        assert_eq!(result.content(), "I am done, I think.");
        assert_eq!(result.metadata_value("abnormal_termination"), Some(&json!(true)));
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(1)));
        assert_eq!(result.error_code(), Some(ErrorCode::AbnormalTermination));
        assert!(result.metadata_value("budget_exhausted").is_none());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_after_exactly_max_steps() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::repeating(respond(
            "",
            vec![tool_call("t", "read_file", json!({ "filepath": "missing.txt" }))],
        )));
        let mut agent = agent(&fx, Arc::clone(&client)).with_max_steps(3);

        let result = agent.run("Loop forever").await;

        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Max steps (3) reached without completion"));
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(3)));
        assert_eq!(result.metadata_value("budget_exhausted"), Some(&json!(true)));
        assert!(result.metadata_value("abnormal_termination").is_none());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_tool_failure_feeds_back_and_loop_continues() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![
            respond("", vec![tool_call("t1", "read_file", json!({ "filepath": "../../etc/passwd" }))]),
            complete("t2", true, "Recovered"),
        ]));
        let mut agent = agent(&fx, Arc::clone(&client));

        let result = agent.run("Read").await;
        assert!(result.is_success());

        let second_request = &client.requests()[1];
        let tool_message = second_request.last().unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("t1"));
        assert!(tool_message
            .text()
            .starts_with("Error: Access denied: ../../etc/passwd"));
        assert!(agent.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_without_new_model_call() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![
            respond(
                "",
                vec![
                    tool_call("t1", "launch_rockets", json!({})),
                    write_call("t2", "a.txt"),
                ],
            ),
            complete("t3", true, "ok"),
        ]));
        let mut agent = agent(&fx, Arc::clone(&client));
        agent.run("Try").await;

        let history = &client.requests()[1];
        let n = history.len();
        assert_eq!(history[n - 2].text(), "Error: Unknown tool: launch_rockets");
        assert!(history[n - 1].text().starts_with("Overwrote"));
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_calls_after_completion_are_not_executed() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![respond(
            "",
            vec![
                write_call("t1", "before.txt"),
                tool_call("t2", "complete_task", json!({ "success": true, "summary": "done" })),
                write_call("t3", "after.txt"),
            ],
        )]));
        let mut agent = agent(&fx, client);

        let result = agent.run("Write twice").await;

        assert!(result.is_success());
        assert!(fx.workspace.root().join("before.txt").exists());
        assert!(!fx.workspace.root().join("after.txt").exists());
        assert_eq!(agent.output_files().len(), 1);

        let last = agent.messages().last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("t3"));
        assert_eq!(last.text(), SKIPPED_AFTER_COMPLETION);
    }

    #[tokio::test]
    async fn test_repeated_call_ids_each_get_an_answer() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![
            respond(
                "",
                vec![
                    write_call("", "a.txt"),
                    write_call("", "b.txt"),
                    write_call("dup", "c.txt"),
                    write_call("dup", "d.txt"),
                ],
            ),
            complete("t9", true, "done"),
        ]));
        let mut agent = agent(&fx, Arc::clone(&client));

        let result = agent.run("Write four files").await;

        assert!(result.is_success());
        for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
            assert!(fx.workspace.root().join(name).exists(), "{} missing", name);
        }

        let assistant = &client.requests()[1][2];
        let ids: Vec<&str> = assistant.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["call_1_0", "call_1_1", "dup", "call_1_3"]);
        let requests = client.requests();
        let answered: Vec<&str> = requests[1][3..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(answered, ids);
    }

    #[test]
    fn test_local_ids_do_not_collide_with_model_ids() {
        let mut calls = vec![
            tool_call("call_2_1", "read_file", json!({})),
            tool_call("", "read_file", json!({})),
        ];
        assign_unique_call_ids(&mut calls, 2);
        assert_eq!(calls[0].id, "call_2_1");
        assert_eq!(calls[1].id, "call_2_1_");
    }

    #[tokio::test]
    async fn test_transport_error_becomes_failed_result() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::failing("API error 529: overloaded"));
        let result = agent(&fx, client).run("Research").await;

        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some(ErrorCode::AgentError));
        assert!(result
            .error()
            .unwrap()
            .starts_with("Agent execution error: API error 529"));
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(1)));
        assert_eq!(result.metadata_value("output_files"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_flag_per_run() {
        let outcomes = [
            vec![complete("t", true, "ok")],
            vec![respond("no tools", vec![])],
        ];
        for script in outcomes {
            let fx = fixture();
            let client = Arc::new(ScriptedClient::new(script));
            let result = agent(&fx, client).with_max_steps(1).run("task").await;
            let flags = [
                result.metadata_value("explicitly_completed").is_some(),
                result.metadata_value("abnormal_termination").is_some(),
                result.metadata_value("budget_exhausted").is_some(),
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{:?}", result);
        }
    }

    #[tokio::test]
    async fn test_reset_truncates_history_and_keeps_output_files() {
        let fx = fixture();
        let client = Arc::new(ScriptedClient::new(vec![
            respond("", vec![write_call("t1", "a.txt")]),
            complete("t2", true, "first"),
            complete("t3", true, "second"),
        ]));
        let mut agent = agent(&fx, Arc::clone(&client));

        agent.run("First").await;
        assert_eq!(agent.step_count(), 2);
        agent.reset();
        assert_eq!(agent.messages().len(), 1);
        assert_eq!(agent.step_count(), 0);
        assert_eq!(agent.output_files().len(), 1);

        let result = agent.run("Second").await;
        assert_eq!(result.content(), "second");
        assert_eq!(result.metadata_value("steps_used"), Some(&json!(1)));
        assert_eq!(client.requests()[2].len(), 2);
    }

    #[tokio::test]
    async fn test_trace_receives_run_events() {
        let fx = fixture();
        let trace = Arc::new(MemoryTrace::default());
        let client = Arc::new(ScriptedClient::new(vec![
            respond("", vec![write_call("t1", "a.txt")]),
            complete("t2", true, "done"),
        ]));
        let mut agent = agent(&fx, client)
            .with_trace(Some(trace.clone() as Arc<dyn TraceSink>))
            .with_parent(Some("orchestrator".to_string()));

        agent.run("Write").await;

        let events = trace.events();
        assert!(matches!(
            &events[0],
            TraceEvent::AgentStart { parent_agent: Some(p), .. } if p == "orchestrator"
        ));
        assert!(matches!(&events[1], TraceEvent::LlmCall { .. }));
        assert!(matches!(
            &events[2],
            TraceEvent::ToolCall { tool_name, parent_agent: Some(_), .. } if tool_name == "write_file"
        ));
        assert!(matches!(
            events.last().unwrap(),
            TraceEvent::AgentComplete { success: true, steps_used: 2, .. }
        ));
    }
}
