//! Tool implementations
//!
//! - read_file: Read files with line numbers
//! - write_file: Create, overwrite, or append to files
//! - edit_file: Replace a unique exact string
//! - execute_shell: Run shell commands in the workspace
//! - web_search: Query the search provider
//! - call_agent: Delegate to an assistant agent
//! - complete_task: End the agent loop

pub mod call_agent;
pub mod complete;
pub mod edit;
pub mod read;
pub mod search;
pub mod shell;
pub mod write;

pub use call_agent::CallAgentTool;
pub use complete::CompleteTool;
pub use edit::EditTool;
pub use read::ReadTool;
pub use search::WebSearchTool;
pub use shell::ShellTool;
pub use write::{WriteMode, WriteTool};
