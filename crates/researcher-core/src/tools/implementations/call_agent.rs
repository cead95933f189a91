//! Call agent tool - Delegate a task to a specialized assistant agent
//!
//! The nested agent is built, run and dropped inside one `execute` call.
//! It shares the model client, workspace and trace sink with the caller
//! but keeps its own message history.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::agent::{build_agent, AgentKind, AgentServices};
use crate::constants::agent::DELEGATION_MAX_STEPS_LIMIT;
use crate::tools::registry::{panic_message, ErrorCode, Tool};
use crate::tools::truncation::clip;
use crate::tools::{parse_params, ToolResult};

pub struct CallAgentTool {
    services: AgentServices,
    parent: String,
}

impl CallAgentTool {
    pub fn new(services: AgentServices, parent: impl Into<String>) -> Self {
        Self {
            services,
            parent: parent.into(),
        }
    }
}

#[derive(Deserialize)]
struct Params {
    agent_type: String,
    task_description: String,
    #[serde(default)]
    context_files: Vec<String>,
    #[serde(default)]
    max_steps: Option<i64>,
}

fn with_context_hint(task: &str, context_files: &[String]) -> String {
    if context_files.is_empty() {
        return task.to_string();
    }
    format!(
        "{}\n\nContext files to review: {}\nRead these files first to understand the existing work.",
        task,
        context_files.join(", ")
    )
}

fn assistant_names() -> Vec<&'static str> {
    AgentKind::ASSISTANTS.iter().map(AgentKind::as_str).collect()
}

#[async_trait]
impl Tool for CallAgentTool {
    fn name(&self) -> &str {
        "call_agent"
    }

    fn description(&self) -> &str {
        "Call a specialized assistant agent to perform a specific task. \
         Available agents: 'searcher' (web search and information gathering), \
         'analyzer' (deep analysis of information), \
         'writer' (report and document writing). \
         The agent will work autonomously and return a summary plus \
         file paths where detailed results are saved."
    }

    fn parameters(&self) -> Value {
        let default_steps = self.services.config.agents.assistant_max_steps;
        json!({
            "type": "object",
            "properties": {
                "agent_type": {
                    "type": "string",
                    "enum": assistant_names(),
                    "description": "Type of agent to call. \
                        'searcher': Search web and gather information. \
                        'analyzer': Analyze collected data and extract insights. \
                        'writer': Write reports and documents."
                },
                "task_description": {
                    "type": "string",
                    "description": "Clear description of the task for the agent. Be specific about what you want the agent to do."
                },
                "context_files": {
                    "type": "array",
                    "items": { "type": "string" },
                    "default": [],
                    "description": "Optional list of file paths the agent should read for context (relative to workspace)."
                },
                "max_steps": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": DELEGATION_MAX_STEPS_LIMIT,
                    "default": default_steps,
                    "description": format!(
                        "Maximum number of steps the agent can take (default: {}).",
                        default_steps
                    )
                }
            },
            "required": ["agent_type", "task_description"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let kind = match AgentKind::parse(params.agent_type.trim()) {
            Some(kind) if kind.is_assistant() => kind,
            _ => {
                return ToolResult::invalid_parameters(format!(
                    "agent_type must be one of {}",
                    assistant_names().join(", ")
                ))
            }
        };

        let task = params.task_description.trim();
        if task.is_empty() {
            return ToolResult::invalid_parameters("task_description must not be empty");
        }

        let max_steps = match params.max_steps {
            None => self.services.config.agents.assistant_max_steps,
            Some(n) if n >= 1 && n <= DELEGATION_MAX_STEPS_LIMIT as i64 => n as usize,
            Some(_) => {
                return ToolResult::invalid_parameters(format!(
                    "max_steps must be between 1 and {}",
                    DELEGATION_MAX_STEPS_LIMIT
                ))
            }
        };

        info!(
            parent = %self.parent,
            agent = kind.as_str(),
            max_steps,
            task = %clip(task, 100),
            "Delegating task"
        );

        let built = build_agent(
            kind,
            &self.services,
            Some(max_steps),
            Some(self.parent.as_str()),
        );
        let mut agent = match built {
            Ok(agent) => agent,
            Err(e) => {
                error!(agent = kind.as_str(), "Failed to create agent: {}", e);
                return ToolResult::failure_with_code(
                    ErrorCode::AgentError,
                    format!("Failed to create {} agent: {}", kind, e),
                )
                .with_metadata("agent_type", kind.as_str());
            }
        };

        let full_task = with_context_hint(task, &params.context_files);
        match AssertUnwindSafe(agent.run(&full_task)).catch_unwind().await {
            Ok(result) => {
                info!(
                    agent = kind.as_str(),
                    success = result.is_success(),
                    steps = agent.step_count(),
                    "Delegated agent finished"
                );
                result
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(agent = kind.as_str(), "Delegated agent crashed: {}", message);
                ToolResult::failure_with_code(
                    ErrorCode::AgentError,
                    format!("Agent execution failed: {}", message),
                )
                .with_metadata("agent_type", kind.as_str())
                .with_metadata("exception", message)
            }
        }
    }
}
