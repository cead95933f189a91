//! Tools for Researcher agents
//!
//! Provides the tool contract, the registry, and all built-in tools.

pub mod implementations;
pub mod path_utils;
pub mod registry;
pub mod truncation;

pub use registry::{parse_params, ErrorCode, Tool, ToolDescriptor, ToolRegistry, ToolResult};
