//! Deterministic embedder for unit tests.

use super::Embedder;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Hashes characters into buckets, so texts sharing characters land close
/// together under cosine or L2 distance.
pub(crate) struct CharBagEmbedder {
    dimension: usize,
    pub(crate) calls: AtomicUsize,
}

impl CharBagEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Embedder for CharBagEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dimension];
        for c in text.to_lowercase().chars().filter(|c| !c.is_whitespace()) {
            vector[(c as usize) % self.dimension] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn model_name(&self) -> &str {
        "char-bag"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
