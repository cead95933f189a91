//! Researcher core library
//!
//! Drives language-model agents through a sandboxed workspace:
//! - `workspace` - the authorized root directory and path checks
//! - `tools` - tool contract, registry, and built-in tools
//! - `agent` - the execution loop, agent roles, and trace recording
//! - `ai` - model client contract and provider clients
//! - `config` / `prompts` - settings and system prompt loading

pub mod agent;
pub mod ai;
pub mod config;
pub mod constants;
pub mod paths;
pub mod prompts;
pub mod search;
pub mod tools;
pub mod workspace;

#[cfg(test)]
mod test_support;

pub use agent::{build_agent, Agent, AgentKind, AgentServices};
pub use config::Config;
pub use tools::{Tool, ToolResult};
pub use workspace::{Workspace, WorkspaceError};
