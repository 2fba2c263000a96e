//! Conversation memory strategies: full buffer, sliding window, rolling summary.

#[cfg(test)]
mod tests;

use crate::llm::{ChatModel, Message};
use crate::{LabError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_WINDOW_SIZE: usize = 5;

const SUMMARY_SYSTEM_PROMPT: &str = "你负责维护对话摘要。请把新的对话内容融入已有摘要，返回更新后的简洁摘要，只输出摘要本身。";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    #[default]
    Buffer,
    Window,
    Summary,
}

impl fmt::Display for MemoryKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryKind::Buffer => write!(f, "buffer"),
            MemoryKind::Window => write!(f, "window"),
            MemoryKind::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub ai: String,
}

/// Snapshot reported by [`ConversationMemory::info`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInfo {
    pub kind: MemoryKind,
    /// Exchanges currently held (for `Summary`, exchanges folded in so far)
    pub exchanges: usize,
    pub summary: Option<String>,
}

impl fmt::Display for MemoryInfo {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "记忆类型: {}, 对话轮数: {}", self.kind, self.exchanges)?;
        if let Some(summary) = &self.summary {
            write!(f, "\n摘要: {}", summary)?;
        }
        Ok(())
    }
}

pub enum ConversationMemory {
    Buffer {
        exchanges: Vec<Exchange>,
    },
    Window {
        k: usize,
        exchanges: VecDeque<Exchange>,
    },
    Summary {
        summary: String,
        folded: usize,
        model: Arc<dyn ChatModel>,
    },
}

impl fmt::Debug for ConversationMemory {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversationMemory({})", self.info())
    }
}

impl ConversationMemory {
    #[inline]
    pub fn buffer() -> Self {
        Self::Buffer {
            exchanges: Vec::new(),
        }
    }

    #[inline]
    pub fn window(k: usize) -> Self {
        Self::Window {
            k: k.max(1),
            exchanges: VecDeque::new(),
        }
    }

    #[inline]
    pub fn summary(model: Arc<dyn ChatModel>) -> Self {
        Self::Summary {
            summary: String::new(),
            folded: 0,
            model,
        }
    }

    /// Build the strategy named by `kind`. `Summary` needs a model.
    #[inline]
    pub fn from_kind(
        kind: MemoryKind,
        window_size: usize,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        match kind {
            MemoryKind::Buffer => Ok(Self::buffer()),
            MemoryKind::Window => Ok(Self::window(window_size)),
            MemoryKind::Summary => model
                .map(Self::summary)
                .ok_or_else(|| LabError::Config("summary memory requires a chat model".to_string())),
        }
    }

    #[inline]
    pub fn kind(&self) -> MemoryKind {
        match self {
            Self::Buffer { .. } => MemoryKind::Buffer,
            Self::Window { .. } => MemoryKind::Window,
            Self::Summary { .. } => MemoryKind::Summary,
        }
    }

    /// Messages to place between the system prompt and the new user query
    #[inline]
    pub fn context_messages(&self) -> Vec<Message> {
        fn replay<'a>(exchanges: impl Iterator<Item = &'a Exchange>) -> Vec<Message> {
            exchanges
                .flat_map(|e| [Message::user(e.user.clone()), Message::assistant(e.ai.clone())])
                .collect()
        }

        match self {
            Self::Buffer { exchanges } => replay(exchanges.iter()),
            Self::Window { exchanges, .. } => replay(exchanges.iter()),
            Self::Summary { summary, .. } if summary.is_empty() => Vec::new(),
            Self::Summary { summary, .. } => {
                vec![Message::system(format!("以下是之前对话的摘要：\n{}", summary))]
            }
        }
    }

    /// Record one exchange. The summary strategy asks its model to fold the
    /// exchange into the running summary before returning; if that call
    /// fails the exchange is appended verbatim.
    #[inline]
    pub fn save(&mut self, user: &str, ai: &str) {
        let exchange = Exchange {
            user: user.to_string(),
            ai: ai.to_string(),
        };

        match self {
            Self::Buffer { exchanges } => exchanges.push(exchange),
            Self::Window { k, exchanges } => {
                exchanges.push_back(exchange);
                while exchanges.len() > *k {
                    exchanges.pop_front();
                }
            }
            Self::Summary {
                summary,
                folded,
                model,
            } => {
                let prompt = format!(
                    "当前摘要：\n{}\n\n新的对话：\n用户：{}\nAI：{}\n\n更新后的摘要：",
                    if summary.is_empty() { "（无）" } else { summary.as_str() },
                    exchange.user,
                    exchange.ai
                );
                match model.complete(SUMMARY_SYSTEM_PROMPT, &prompt, 0.0) {
                    Ok(updated) if !updated.is_empty() => *summary = updated,
                    Ok(_) | Err(_) => {
                        warn!("Summary update failed, appending exchange verbatim");
                        if !summary.is_empty() {
                            summary.push('\n');
                        }
                        summary.push_str("用户：");
                        summary.push_str(&exchange.user);
                        summary.push_str(" / AI：");
                        summary.push_str(&exchange.ai);
                    }
                }
                *folded += 1;
            }
        }
        debug!("Memory now holds {}", self.info());
    }

    #[inline]
    pub fn clear(&mut self) {
        match self {
            Self::Buffer { exchanges } => exchanges.clear(),
            Self::Window { exchanges, .. } => exchanges.clear(),
            Self::Summary {
                summary, folded, ..
            } => {
                summary.clear();
                *folded = 0;
            }
        }
    }

    #[inline]
    pub fn info(&self) -> MemoryInfo {
        match self {
            Self::Buffer { exchanges } => MemoryInfo {
                kind: MemoryKind::Buffer,
                exchanges: exchanges.len(),
                summary: None,
            },
            Self::Window { exchanges, .. } => MemoryInfo {
                kind: MemoryKind::Window,
                exchanges: exchanges.len(),
                summary: None,
            },
            Self::Summary {
                summary, folded, ..
            } => MemoryInfo {
                kind: MemoryKind::Summary,
                exchanges: *folded,
                summary: (!summary.is_empty()).then(|| summary.clone()),
            },
        }
    }
}
