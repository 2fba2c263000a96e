//! Tool-calling agent loop.
//!
//! The agent alternates between asking the model for the next action and
//! running the tools it requests, until the model answers without tool
//! calls or the iteration budget runs out.


pub mod memory;

pub use memory::{ConversationMemory, MemoryInfo, MemoryKind};

use crate::llm::{ChatModel, Message};
use crate::tools::ToolRegistry;
use crate::{LabError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit.";
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个有用的AI助手。你可以使用以下工具来帮助回答问题：计算器、天气查询和知识库搜索。请根据用户的问题选择合适的工具，并基于工具返回的结果给出最终答案。";

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentStep {
    pub tool: String,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    pub answer: String,
    pub steps: Vec<AgentStep>,
    /// Model calls made
    pub iterations: u32,
}

impl AgentOutcome {
    #[inline]
    pub fn hit_iteration_limit(&self) -> bool {
        self.answer == ITERATION_LIMIT_MESSAGE
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: u32,
    temperature: f32,
    memory: Option<ConversationMemory>,
}

impl Agent {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            temperature: 0.0,
            memory: None,
        }
    }

    #[inline]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn with_memory(mut self, memory: ConversationMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    #[inline]
    pub fn memory(&self) -> Option<&ConversationMemory> {
        self.memory.as_ref()
    }

    #[inline]
    pub fn memory_mut(&mut self) -> Option<&mut ConversationMemory> {
        self.memory.as_mut()
    }

    #[inline]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    #[inline]
    pub fn run(&mut self, query: &str) -> Result<AgentOutcome> {
        info!("Agent received query: {}", query);

        let mut messages = vec![Message::system(self.system_prompt.clone())];
        if let Some(memory) = &self.memory {
            messages.extend(memory.context_messages());
        }
        messages.push(Message::user(query));

        let specs = self.tools.to_specs();
        let mut steps = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!("Agent iteration {}/{}", iteration, self.max_iterations);

            let reply = self
                .model
                .chat(&messages, &specs, self.temperature)
                .map_err(|e| LabError::Llm(format!("{:#}", e)))?;

            let calls = reply.requested_calls().to_vec();
            if calls.is_empty() {
                let answer = reply.text().trim().to_string();
                info!(
                    "Agent finished after {} iteration(s) and {} tool call(s)",
                    iteration,
                    steps.len()
                );
                if let Some(memory) = &mut self.memory {
                    memory.save(query, &answer);
                }
                return Ok(AgentOutcome {
                    answer,
                    steps,
                    iterations: iteration,
                });
            }

            messages.push(reply);
            for call in calls {
                let name = call.function.name.as_str();
                let input = self.tools.resolve_input(name, &call.function.arguments);
                let output = self.tools.call(name, &input).unwrap_or_else(|| {
                    warn!("Model requested unknown tool {}", name);
                    format!("错误：未知的工具 - {}", name)
                });

                messages.push(Message::tool(call.id.clone(), output.clone()));
                steps.push(AgentStep {
                    tool: name.to_string(),
                    input,
                    output,
                });
            }
        }

        warn!(
            "Agent hit the iteration limit of {} with {} tool call(s)",
            self.max_iterations,
            steps.len()
        );
        Ok(AgentOutcome {
            answer: ITERATION_LIMIT_MESSAGE.to_string(),
            steps,
            iterations: self.max_iterations,
        })
    }
}
