
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
pub const DEFAULT_SEPARATORS: [&str; 8] = ["\n\n", "\n", "。", "！", "？", "，", " ", ""];

/// Configuration for content chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters of the previous chunk repeated at the start of the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Recursive character splitter.
///
/// Text is cut on the coarsest separator present; any piece still longer
/// than `chunk_size` is cut again with the finer separators. Pieces are then
/// merged greedily back up to `chunk_size`, carrying a tail of at most
/// `chunk_overlap` characters into the next chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveSplitter {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl RecursiveSplitter {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("Chunk size must be greater than zero");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        })
    }

    #[inline]
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    #[inline]
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let chunks = self.split_recursive(text, &self.separators);
        debug!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            char_len(text),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()));
        let Some(position) = position else {
            // No separator applies; keep the text whole.
            return trimmed_non_empty(text).into_iter().collect();
        };

        let separator = separators[position].as_str();
        let finer = &separators[position + 1..];
        let (pieces, joiner) = split_on(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, joiner));
                pending.clear();
            }
            if finer.is_empty() {
                chunks.extend(trimmed_non_empty(&piece));
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, joiner));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], joiner: &str) -> Vec<String> {
        let joiner_len = char_len(joiner);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            let glue = if window.is_empty() { 0 } else { joiner_len };

            if total + len + glue > self.chunk_size && !window.is_empty() {
                chunks.extend(join_window(&window, joiner));

                // Drop from the front until only an overlap-sized tail remains
                // and the next piece fits.
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { joiner_len }
                            > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { joiner_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { joiner_len };
            window.push_back(piece);
        }

        chunks.extend(join_window(&window, joiner));
        chunks
    }
}

/// Split on `separator`. Whitespace separators are dropped and re-inserted
/// when merging; other separators stay attached to the preceding text.
fn split_on<'a>(text: &str, separator: &'a str) -> (Vec<String>, &'a str) {
    if separator.is_empty() {
        return (text.chars().map(String::from).collect(), "");
    }

    if separator.trim().is_empty() {
        let pieces = text
            .split(separator)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
        (pieces, separator)
    } else {
        let pieces = text
            .split_inclusive(separator)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect();
        (pieces, "")
    }
}

fn join_window(window: &VecDeque<&str>, joiner: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(joiner);
    trimmed_non_empty(&joined)
}

fn trimmed_non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
#[inline]
pub fn preview(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
