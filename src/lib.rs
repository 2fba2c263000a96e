//! Agent Lab: a tool-calling agent, a local RAG knowledge base, MCP servers
//! and client, a review-and-revise writing workflow and a role-based crew,
//! all driven by one OpenAI-compatible chat model and Ollama embeddings.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabError>;

/// Failures surfaced by the library API, grouped by the backend at fault
#[derive(Error, Debug)]
pub enum LabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod commands;
pub mod config;
pub mod crew;
pub mod database;
pub mod embeddings;
pub mod http;
pub mod llm;
pub mod mcp;
pub mod rag;
pub mod scaffold;
pub mod tools;
pub mod workflow;
