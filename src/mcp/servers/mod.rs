//! Concrete MCP servers served by `agent-lab serve <kind>`

pub mod files;
pub mod math;
pub mod rag;
