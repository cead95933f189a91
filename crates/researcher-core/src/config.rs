//! Runtime configuration
//!
//! Layered: TOML file, then environment variables, then CLI flags (applied
//! by the binary). Every field has a default, so an empty file is valid.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{agent, ai, search, shell};
use crate::paths;
use crate::search::SearchDepth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
        }
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            other => anyhow::bail!("unknown provider '{}' (expected anthropic or openai)", other),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: Provider,
    /// Model id; the provider default when unset
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_key: None,
            base_url: None,
            max_tokens: ai::MAX_OUTPUT_TOKENS,
            temperature: None,
        }
    }
}

impl ModelConfig {
    pub fn model_id(&self) -> String {
        match &self.model {
            Some(model) => model.clone(),
            None => match self.provider {
                Provider::Anthropic => ai::DEFAULT_ANTHROPIC_MODEL.to_string(),
                Provider::OpenAI => ai::DEFAULT_OPENAI_MODEL.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub orchestrator_max_steps: usize,
    /// Default budget for delegated agents
    pub assistant_max_steps: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            orchestrator_max_steps: agent::ORCHESTRATOR_MAX_STEPS,
            assistant_max_steps: agent::ASSISTANT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub default_timeout_secs: u64,
    pub min_timeout_secs: u64,
    pub max_timeout_secs: u64,
    /// Per-stream cap, in characters
    pub max_output_chars: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: shell::DEFAULT_TIMEOUT_SECS,
            min_timeout_secs: shell::MIN_TIMEOUT_SECS,
            max_timeout_secs: shell::MAX_TIMEOUT_SECS,
            max_output_chars: shell::MAX_OUTPUT_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub default_max_results: u32,
    pub max_results_limit: u32,
    pub default_depth: SearchDepth,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_max_results: search::DEFAULT_MAX_RESULTS,
            max_results_limit: search::MAX_RESULTS_LIMIT,
            default_depth: SearchDepth::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: PathBuf,
    /// Record the instrumentation trace into the workspace
    pub trace: bool,
    pub prompts_dir: Option<PathBuf>,
    pub model: ModelConfig,
    pub agents: AgentsConfig,
    pub shell: ShellConfig,
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("./workspace"),
            trace: true,
            prompts_dir: None,
            model: ModelConfig::default(),
            agents: AgentsConfig::default(),
            shell: ShellConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Load from an explicit file, else the default config file if present,
    /// else defaults. Environment overrides are applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = paths::config_file();
                if default_path.is_file() {
                    Self::from_file(&default_path)?
                } else {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config TOML")
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = get("RESEARCHER_PROVIDER") {
            match provider.parse() {
                Ok(provider) => self.model.provider = provider,
                Err(e) => tracing::warn!("Ignoring RESEARCHER_PROVIDER: {}", e),
            }
        }

        self.apply_provider_env(&get);

        if let Some(model) = get("RESEARCHER_MODEL") {
            self.model.model = Some(model);
        }
        if let Some(key) = get("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(dir) = get("RESEARCHER_WORKSPACE") {
            self.workspace = PathBuf::from(dir);
        }
    }

    fn apply_provider_env(&mut self, get: &impl Fn(&str) -> Option<String>) {
        match self.model.provider {
            Provider::Anthropic => {
                if let Some(key) = get("ANTHROPIC_API_KEY") {
                    self.model.api_key = Some(key);
                }
            }
            Provider::OpenAI => {
                if let Some(key) = get("OPENAI_API_KEY") {
                    self.model.api_key = Some(key);
                }
                if let Some(url) = get("OPENAI_BASE_URL") {
                    self.model.base_url = Some(url);
                }
                if let Some(model) = get("OPENAI_MODEL") {
                    self.model.model = Some(model);
                }
            }
        }
    }

    /// Switch provider after loading. Credentials, base URL and model id
    /// belong to the previous provider, so they are dropped and looked up
    /// again for the new one.
    pub fn switch_provider(&mut self, provider: Provider, get: impl Fn(&str) -> Option<String>) {
        if provider == self.model.provider {
            return;
        }
        self.model.provider = provider;
        self.model.api_key = None;
        self.model.base_url = None;
        self.model.model = None;
        self.apply_provider_env(&get);
    }

    /// Prompt override directory: configured, else `~/.researcher/prompts` when it exists
    pub fn prompts_override_dir(&self) -> Option<PathBuf> {
        self.prompts_dir.clone().or_else(|| {
            let dir = paths::prompts_dir();
            dir.is_dir().then_some(dir)
        })
    }
}
