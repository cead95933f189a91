//! Agent roles and their tool sets

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::agent_loop::Agent;
use super::trace::TraceSink;
use crate::ai::ModelClient;
use crate::config::{AgentsConfig, Config};
use crate::prompts::{PromptError, PromptLoader};
use crate::search::SearchProvider;
use crate::tools::implementations::{
    CallAgentTool, CompleteTool, EditTool, ReadTool, ShellTool, WebSearchTool, WriteTool,
};
use crate::tools::ToolRegistry;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Orchestrator,
    Searcher,
    Analyzer,
    Writer,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        Self::Orchestrator,
        Self::Searcher,
        Self::Analyzer,
        Self::Writer,
    ];

    /// Roles the orchestrator may delegate to
    pub const ASSISTANTS: [AgentKind; 3] = [Self::Searcher, Self::Analyzer, Self::Writer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Searcher => "searcher",
            Self::Analyzer => "analyzer",
            Self::Writer => "writer",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn is_assistant(&self) -> bool {
        !matches!(self, Self::Orchestrator)
    }

    pub fn default_max_steps(&self, config: &AgentsConfig) -> usize {
        match self {
            Self::Orchestrator => config.orchestrator_max_steps,
            _ => config.assistant_max_steps,
        }
    }
}

impl FromStr for AgentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::parse(s.trim()).ok_or_else(|| {
            anyhow::anyhow!(
                "unknown agent type '{}' (expected orchestrator, searcher, analyzer, or writer)",
                s
            )
        })
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AgentBuildError {
    #[error("no search provider configured (set TAVILY_API_KEY or [search].api_key)")]
    MissingSearchProvider,

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Collaborators shared by an agent and every agent it delegates to
#[derive(Clone)]
pub struct AgentServices {
    pub client: Arc<dyn ModelClient>,
    pub workspace: Arc<Workspace>,
    pub prompts: Arc<PromptLoader>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub trace: Option<Arc<dyn TraceSink>>,
    pub config: Arc<Config>,
}

impl AgentServices {
    pub fn new(client: Arc<dyn ModelClient>, workspace: Arc<Workspace>, config: Config) -> Self {
        Self {
            client,
            workspace,
            prompts: Arc::new(PromptLoader::builtin()),
            search: None,
            trace: None,
            config: Arc::new(config),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptLoader) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_search(mut self, search: Option<Arc<dyn SearchProvider>>) -> Self {
        self.search = search;
        self
    }

    pub fn with_trace(mut self, trace: Option<Arc<dyn TraceSink>>) -> Self {
        self.trace = trace;
        self
    }
}

impl std::fmt::Debug for AgentServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentServices")
            .field("model", &self.client.model())
            .field("workspace", &self.workspace.root())
            .field("search", &self.search.is_some())
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

/// Tools available to a role, in the order they are offered to the model
pub fn tool_registry(
    kind: AgentKind,
    services: &AgentServices,
) -> Result<ToolRegistry, AgentBuildError> {
    let workspace = &services.workspace;
    let mut registry = ToolRegistry::new();

    if kind == AgentKind::Searcher {
        let provider = services
            .search
            .clone()
            .ok_or(AgentBuildError::MissingSearchProvider)?;
        registry.register(Arc::new(WebSearchTool::new(
            provider,
            services.config.search.clone(),
        )));
    }

    registry.register(Arc::new(ReadTool::new(Arc::clone(workspace))));
    registry.register(Arc::new(WriteTool::new(Arc::clone(workspace))));
    registry.register(Arc::new(EditTool::new(Arc::clone(workspace))));
    registry.register(Arc::new(ShellTool::new(
        Arc::clone(workspace),
        services.config.shell.clone(),
    )));

    if kind == AgentKind::Orchestrator {
        registry.register(Arc::new(CallAgentTool::new(
            services.clone(),
            kind.as_str(),
        )));
    }

    registry.register(Arc::new(CompleteTool));
    Ok(registry)
}

/// Build an agent of `kind`. `max_steps` defaults to the role's configured budget.
pub fn build_agent(
    kind: AgentKind,
    services: &AgentServices,
    max_steps: Option<usize>,
    parent: Option<&str>,
) -> Result<Agent, AgentBuildError> {
    let system_prompt = services.prompts.load(kind.as_str())?;
    let registry = tool_registry(kind, services)?;
    let max_steps = max_steps.unwrap_or_else(|| kind.default_max_steps(&services.config.agents));
    debug!(agent = kind.as_str(), max_steps, parent, "Building agent");

    Ok(Agent::new(
        kind.as_str(),
        system_prompt,
        Arc::clone(&services.client),
        registry,
        Arc::clone(&services.workspace),
    )
    .with_max_steps(max_steps)
    .with_trace(services.trace.clone())
    .with_parent(parent.map(str::to_string)))
}
