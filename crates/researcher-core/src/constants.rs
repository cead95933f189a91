//! Default values shared across the crate

pub mod ai {
    pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
    pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
    pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
    pub const ANTHROPIC_VERSION: &str = "2023-06-01";
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
    pub const MAX_OUTPUT_TOKENS: u32 = 8192;
}

pub mod agent {
    pub const ORCHESTRATOR_MAX_STEPS: usize = 100;
    pub const ASSISTANT_MAX_STEPS: usize = 50;
    /// Upper bound a parent may request for a delegated agent
    pub const DELEGATION_MAX_STEPS_LIMIT: usize = 100;
    /// Cap on the text fed back to the model for a single tool result
    pub const MAX_TOOL_MESSAGE_CHARS: usize = 100_000;
}

pub mod shell {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 600;
    pub const MAX_OUTPUT_CHARS: usize = 50_000;
}

pub mod search {
    pub const TAVILY_API_URL: &str = "https://api.tavily.com/search";
    pub const DEFAULT_MAX_RESULTS: u32 = 10;
    pub const MAX_RESULTS_LIMIT: u32 = 20;
    /// Results included in the textual digest
    pub const DIGEST_RESULTS: usize = 3;
    pub const SNIPPET_MAX_CHARS: usize = 180;
}

pub mod ui {
    pub const CONFIG_DIR_NAME: &str = ".researcher";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
    pub const TRACE_JSONL_FILE: &str = "agent_trace.jsonl";
    pub const TRACE_MARKDOWN_FILE: &str = "agent_trace.md";
}
