//! Execution trace recording
//!
//! `TraceSink` is a pure observer of agent activity. `TraceRecorder` writes
//! every event to `<workspace>/agent_trace.jsonl` as it happens and, on
//! `finalize()`, a Markdown summary to `<workspace>/agent_trace.md`.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::ui::{TRACE_JSONL_FILE, TRACE_MARKDOWN_FILE};
use crate::tools::truncation::clip;

const ARGUMENT_PREVIEW_CHARS: usize = 100;
const CONTENT_PREVIEW_CHARS: usize = 200;

/// One observable step of an agent run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TraceEvent {
    AgentStart {
        agent_type: String,
        task: String,
        parent_agent: Option<String>,
    },
    AgentComplete {
        agent_type: String,
        success: bool,
        summary: String,
        steps_used: usize,
    },
    ToolCall {
        agent_type: String,
        tool_name: String,
        arguments: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_agent: Option<String>,
    },
    ToolResult {
        agent_type: String,
        tool_name: String,
        success: bool,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_agent: Option<String>,
    },
    LlmCall {
        agent_type: String,
        model: String,
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Receives trace events. Must never influence control flow.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentStats {
    pub calls: u64,
    pub tool_calls: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TraceStats {
    pub total_agent_calls: u64,
    pub total_tool_calls: u64,
    pub total_llm_calls: u64,
    pub agents: BTreeMap<String, AgentStats>,
    pub tools: BTreeMap<String, ToolStats>,
}

impl TraceStats {
    fn apply(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::AgentStart { agent_type, .. } => {
                self.total_agent_calls += 1;
                self.agents.entry(agent_type.clone()).or_default().calls += 1;
            }
            TraceEvent::AgentComplete {
                agent_type,
                success,
                ..
            } => {
                let stats = self.agents.entry(agent_type.clone()).or_default();
                if *success {
                    stats.successes += 1;
                } else {
                    stats.failures += 1;
                }
            }
            TraceEvent::ToolCall {
                agent_type,
                tool_name,
                ..
            } => {
                self.total_tool_calls += 1;
                self.agents.entry(agent_type.clone()).or_default().tool_calls += 1;
                self.tools.entry(tool_name.clone()).or_default().calls += 1;
            }
            TraceEvent::ToolResult {
                tool_name, success, ..
            } => {
                let stats = self.tools.entry(tool_name.clone()).or_default();
                if *success {
                    stats.successes += 1;
                } else {
                    stats.failures += 1;
                }
            }
            TraceEvent::LlmCall { .. } => self.total_llm_calls += 1,
        }
    }
}

/// Clip long string arguments so the trace stays readable
fn clip_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, Value::String(clip(&s, ARGUMENT_PREVIEW_CHARS))),
                    other => (key, other),
                })
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn clip_event(event: TraceEvent) -> TraceEvent {
    match event {
        TraceEvent::ToolCall {
            agent_type,
            tool_name,
            arguments,
            parent_agent,
        } => TraceEvent::ToolCall {
            agent_type,
            tool_name,
            arguments: clip_arguments(arguments),
            parent_agent,
        },
        TraceEvent::ToolResult {
            agent_type,
            tool_name,
            success,
            content,
            parent_agent,
        } => TraceEvent::ToolResult {
            agent_type,
            tool_name,
            success,
            content: clip(&content, CONTENT_PREVIEW_CHARS),
            parent_agent,
        },
        other => other,
    }
}

struct RecorderState {
    events: Vec<(DateTime<Local>, TraceEvent)>,
    stats: TraceStats,
    finalized: bool,
}

/// File-backed trace sink
///
/// I/O failures are logged and otherwise ignored.
pub struct TraceRecorder {
    jsonl_path: PathBuf,
    markdown_path: PathBuf,
    session_start: DateTime<Local>,
    started: Instant,
    state: Mutex<RecorderState>,
}

impl TraceRecorder {
    /// Start a session in `dir`: the JSONL log is appended to, the Markdown
    /// summary is restarted with a fresh header.
    pub fn new(dir: &Path) -> Self {
        let recorder = Self {
            jsonl_path: dir.join(TRACE_JSONL_FILE),
            markdown_path: dir.join(TRACE_MARKDOWN_FILE),
            session_start: Local::now(),
            started: Instant::now(),
            state: Mutex::new(RecorderState {
                events: Vec::new(),
                stats: TraceStats::default(),
                finalized: false,
            }),
        };
        recorder.write_header();
        recorder
    }

    pub fn jsonl_path(&self) -> &Path {
        &self.jsonl_path
    }

    pub fn markdown_path(&self) -> &Path {
        &self.markdown_path
    }

    pub fn stats(&self) -> TraceStats {
        self.state.lock().stats.clone()
    }

    /// Append the `session_complete` event and the Markdown summary.
    /// Only the first call has any effect.
    pub fn finalize(&self) {
        let mut state = self.state.lock();
        if state.finalized {
            return;
        }
        state.finalized = true;

        let duration = self.started.elapsed().as_secs_f64();
        let mut line = Map::new();
        line.insert("timestamp".into(), Value::String(Local::now().to_rfc3339()));
        line.insert("event_type".into(), Value::String("session_complete".into()));
        line.insert("duration_seconds".into(), Value::from(duration));
        line.insert(
            "statistics".into(),
            serde_json::to_value(&state.stats).unwrap_or(Value::Null),
        );
        self.append_line(&Value::Object(line));

        let summary = render_summary(&state.stats, &state.events, duration);
        if let Err(e) = append_to(&self.markdown_path, &summary) {
            warn!(path = %self.markdown_path.display(), "Failed to write trace summary: {}", e);
        }
        debug!(events = state.events.len(), "Trace finalized");
    }

    fn write_header(&self) {
        if let Err(e) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.jsonl_path)
        {
            warn!(path = %self.jsonl_path.display(), "Failed to open trace log: {}", e);
        }
        let header = format!(
            "# Agent Trace Log\n\nSession started: {}\n\n---\n\n",
            self.session_start.to_rfc3339()
        );
        if let Err(e) = std::fs::write(&self.markdown_path, header) {
            warn!(path = %self.markdown_path.display(), "Failed to write trace header: {}", e);
        }
    }

    fn append_line(&self, value: &Value) {
        if let Err(e) = append_to(&self.jsonl_path, &format!("{}\n", value)) {
            warn!(path = %self.jsonl_path.display(), "Failed to append trace event: {}", e);
        }
    }
}

impl TraceSink for TraceRecorder {
    fn record(&self, event: TraceEvent) {
        let event = clip_event(event);
        let timestamp = Local::now();

        let mut line = match serde_json::to_value(&event) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        line.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));

        let mut state = self.state.lock();
        state.stats.apply(&event);
        self.append_line(&Value::Object(line));
        state.events.push((timestamp, event));
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("jsonl_path", &self.jsonl_path)
            .field("markdown_path", &self.markdown_path)
            .finish()
    }
}

fn append_to(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}

fn render_summary(
    stats: &TraceStats,
    events: &[(DateTime<Local>, TraceEvent)],
    duration: f64,
) -> String {
    let mut out = String::new();
    out.push_str("\n\n## Session Summary\n\n");
    out.push_str(&format!("- **Duration**: {:.2} seconds\n", duration));
    out.push_str(&format!("- **Total Agent Calls**: {}\n", stats.total_agent_calls));
    out.push_str(&format!("- **Total Tool Calls**: {}\n", stats.total_tool_calls));
    out.push_str(&format!("- **Total LLM Calls**: {}\n\n", stats.total_llm_calls));

    out.push_str("### Agent Statistics\n\n");
    out.push_str("| Agent | Calls | Tools | Success | Failure |\n");
    out.push_str("|-------|-------|-------|---------|---------|\n");
    for (agent, s) in &stats.agents {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            agent, s.calls, s.tool_calls, s.successes, s.failures
        ));
    }

    out.push_str("\n### Tool Statistics\n\n");
    out.push_str("| Tool | Calls | Success | Failure | Success Rate |\n");
    out.push_str("|------|-------|---------|---------|--------------|\n");
    for (tool, s) in &stats.tools {
        let rate = if s.calls > 0 {
            s.successes as f64 / s.calls as f64 * 100.0
        } else {
            0.0
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {:.1}% |\n",
            tool, s.calls, s.successes, s.failures, rate
        ));
    }

    out.push_str("\n### Event Timeline\n\n");
    for (timestamp, event) in events {
        let time = timestamp.format("%H:%M:%S");
        let line = match event {
            TraceEvent::AgentStart {
                agent_type, task, ..
            } => format!("- **{}** - `{}` started: {}\n", time, agent_type, clip(task, 80)),
            TraceEvent::AgentComplete {
                agent_type,
                success,
                steps_used,
                ..
            } => format!(
                "- **{}** - {} `{}` completed ({} steps)\n",
                time,
                if *success { "✅" } else { "❌" },
                agent_type,
                steps_used
            ),
            TraceEvent::ToolCall {
                agent_type,
                tool_name,
                ..
            } => format!("  - **{}** - `{}` → `{}`\n", time, agent_type, tool_name),
            TraceEvent::ToolResult {
                tool_name,
                success,
                content,
                ..
            } => format!(
                "  - **{}** - {} `{}`: {}\n",
                time,
                if *success { "✓" } else { "✗" },
                tool_name,
                clip(content, 60)
            ),
            TraceEvent::LlmCall {
                model,
                input_tokens,
                output_tokens,
                ..
            } => format!(
                "  - **{}** - LLM call ({}): {}→{} tokens\n",
                time, model, input_tokens, output_tokens
            ),
        };
        out.push_str(&line);
    }

    out.push_str("\n---\n\n");
    out.push_str(&format!("Session ended: {}\n", Local::now().to_rfc3339()));
    out
}
