//! MCP (Model Context Protocol) Implementation
//!
//! JSON-RPC 2.0 over stdio following MCP protocol version 2025-06-18: a
//! server framework with tool and resource registries, a client that drives
//! a server as a child process, and the concrete math, file and RAG servers.

pub mod client;
pub mod errors;
pub mod protocol;
pub mod server;
pub mod servers;
pub mod validation;


pub use client::McpClient;
pub use errors::{McpError, McpResult};
pub use server::{ConnectionState, McpServer, ResourceHandler, ToolHandler};
