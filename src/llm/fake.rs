//! In-process chat models for unit tests.

use super::{ChatModel, Message, ToolSpec};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned replies in order, then answers with `fallback`.
pub(crate) struct ScriptedModel {
    replies: Mutex<VecDeque<Message>>,
    fallback: String,
    pub(crate) seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub(crate) fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: "ok".to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = fallback.to_string();
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().expect("lock").len()
    }

    pub(crate) fn last_prompt(&self) -> Vec<Message> {
        self.seen
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

impl ChatModel for ScriptedModel {
    fn chat(&self, messages: &[Message], _tools: &[ToolSpec], _temperature: f32) -> Result<Message> {
        self.seen.lock().expect("lock").push(messages.to_vec());
        let next = self.replies.lock().expect("lock").pop_front();
        Ok(next.unwrap_or_else(|| Message::assistant(self.fallback.clone())))
    }
}

/// Answers every request with `f(last user message)`.
pub(crate) struct FnModel<F>(pub(crate) F);

impl<F> ChatModel for FnModel<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn chat(&self, messages: &[Message], _tools: &[ToolSpec], _temperature: f32) -> Result<Message> {
        let prompt = messages.last().map(Message::text).unwrap_or_default();
        Ok(Message::assistant((self.0)(prompt)))
    }
}

/// Always fails, for error-path tests.
pub(crate) struct FailingModel;

impl ChatModel for FailingModel {
    fn chat(&self, _messages: &[Message], _tools: &[ToolSpec], _temperature: f32) -> Result<Message> {
        Err(anyhow::anyhow!("model unavailable"))
    }
}
