//! Agent system for Researcher
//!
//! ## Execution loop
//! - `Agent` - One model call per step, tools run in listed order
//! - `Conversation` - Append-only history seeded with the system prompt
//!
//! ## Roles
//! - `AgentKind` - orchestrator, searcher, analyzer, writer
//! - `AgentServices` - Collaborators shared across delegated agents
//! - `build_agent` - Role prompt plus role tool set
//!
//! ## Trace
//! - `TraceSink` - Optional observer of agent activity
//! - `TraceRecorder` - JSONL event log plus Markdown summary

pub mod agent_loop;
pub mod conversation;
pub mod roles;
pub mod trace;

pub use agent_loop::Agent;
pub use conversation::{Conversation, ConversationError};
pub use roles::{build_agent, tool_registry, AgentBuildError, AgentKind, AgentServices};
pub use trace::{TraceEvent, TraceRecorder, TraceSink, TraceStats};
