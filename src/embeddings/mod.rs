// Embeddings: the Ollama client and the recursive text splitter

pub mod chunking;
#[cfg(test)]
pub(crate) mod fake;
pub mod ollama;

pub use chunking::{ChunkingConfig, RecursiveSplitter};
pub use ollama::OllamaClient;

use anyhow::Result;

/// Turns text into fixed-length vectors.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;
}
