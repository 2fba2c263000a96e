//! Sequential multi-agent crew.
//!
//! Every task is handed to the crew member whose role it names. That member
//! runs its own tool-calling [`Agent`] with a persona prompt, and sees the
//! outputs of every earlier task as context.

#[cfg(test)]
mod tests;

pub mod tools;

use crate::agent::{Agent, AgentStep};
use crate::llm::ChatModel;
use crate::tools::{Tool, ToolRegistry};
use crate::{LabError, Result};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

pub use tools::{TextAnalysis, TopicSearch};

pub const DEFAULT_CREW_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_ARTICLE_TYPE: &str = "技术博客";

pub const RESEARCHER: &str = "资深研究员";
pub const WRITER: &str = "技术写作专家";
pub const ANALYST: &str = "内容质量分析师";
pub const COORDINATOR: &str = "项目协调员";

pub struct CrewAgent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub allow_delegation: bool,
    tools: ToolRegistry,
}

impl CrewAgent {
    #[inline]
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            allow_delegation: false,
            tools: ToolRegistry::new(),
        }
    }

    #[inline]
    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[inline]
    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    #[inline]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    fn persona(&self) -> String {
        format!(
            "你是{}。\n你的目标：{}\n你的背景：{}\n请以这个身份完成分配给你的任务，必要时使用可用的工具。",
            self.role, self.goal, self.backstory
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewTask {
    pub description: String,
    pub expected_output: String,
    pub agent_role: String,
}

impl CrewTask {
    #[inline]
    pub fn new(description: &str, expected_output: &str, agent_role: &str) -> Self {
        Self {
            description: description.to_string(),
            expected_output: expected_output.to_string(),
            agent_role: agent_role.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub agent_role: String,
    pub description: String,
    pub output: String,
    pub steps: Vec<AgentStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
    pub final_output: String,
}

impl CrewOutput {
    #[inline]
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (i, task) in self.tasks.iter().enumerate() {
            let _ = writeln!(out, "🔸 任务 {} - {}", i + 1, task.agent_role);
            for step in &task.steps {
                let _ = writeln!(out, "  🔧 {}({}) → {}", step.tool, step.input, step.output);
            }
            let _ = writeln!(out, "{}\n", task.output);
        }
        let _ = write!(out, "{}\n✅ 最终结果：\n{}", "=".repeat(60), self.final_output);
        out
    }
}

pub struct Crew {
    model: Arc<dyn ChatModel>,
    agents: Vec<CrewAgent>,
    temperature: f32,
    max_iterations: u32,
}

impl Crew {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            agents: Vec::new(),
            temperature: DEFAULT_CREW_TEMPERATURE,
            max_iterations: crate::agent::DEFAULT_MAX_ITERATIONS,
        }
    }

    #[inline]
    pub fn with_agent(mut self, agent: CrewAgent) -> Self {
        self.agents.push(agent);
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[inline]
    pub fn agents(&self) -> &[CrewAgent] {
        &self.agents
    }

    fn agent(&self, role: &str) -> Result<&CrewAgent> {
        self.agents
            .iter()
            .find(|a| a.role == role)
            .ok_or_else(|| LabError::Config(format!("No crew member with role '{}'", role)))
    }

    /// Role, goal, tools and delegation of every member
    #[inline]
    pub fn agent_info(&self) -> String {
        let mut out = String::from("👥 团队成员：\n");
        for agent in &self.agents {
            let tools: Vec<&str> = agent.tools.names().collect();
            let _ = writeln!(out, "\n🔹 {}", agent.role);
            let _ = writeln!(out, "  目标：{}", agent.goal);
            let _ = writeln!(
                out,
                "  工具：{}",
                if tools.is_empty() {
                    "无".to_string()
                } else {
                    tools.join(", ")
                }
            );
            let _ = writeln!(
                out,
                "  可委派：{}",
                if agent.allow_delegation { "是" } else { "否" }
            );
        }
        out
    }

    /// Run `tasks` in order; each sees every earlier output as context
    #[inline]
    pub fn kickoff(&self, tasks: &[CrewTask]) -> Result<CrewOutput> {
        if tasks.is_empty() {
            return Err(LabError::Config("A crew needs at least one task".to_string()));
        }
        // Fail before any model call if a task names a missing member
        for task in tasks {
            self.agent(&task.agent_role)?;
        }

        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let member = self.agent(&task.agent_role)?;
            info!(
                "Crew task {}/{} assigned to {}",
                i + 1,
                tasks.len(),
                member.role
            );

            let prompt = task_prompt(task, &outputs);
            let mut agent = Agent::new(Arc::clone(&self.model), member.tools.clone())
                .with_system_prompt(member.persona())
                .with_temperature(self.temperature)
                .with_max_iterations(self.max_iterations);
            let outcome = agent.run(&prompt)?;
            debug!(
                "{} finished with {} tool call(s)",
                member.role,
                outcome.steps.len()
            );

            outputs.push(TaskOutput {
                agent_role: member.role.clone(),
                description: task.description.clone(),
                output: outcome.answer,
                steps: outcome.steps,
            });
        }

        let final_output = outputs
            .last()
            .map(|t| t.output.clone())
            .unwrap_or_default();
        Ok(CrewOutput {
            tasks: outputs,
            final_output,
        })
    }

    /// The four-member research and writing crew with its task sequence
    #[inline]
    pub fn research_writing(
        model: Arc<dyn ChatModel>,
        topic: &str,
        article_type: &str,
    ) -> (Self, Vec<CrewTask>) {
        let crew = Self::new(model)
            .with_agent(
                CrewAgent::new(
                    RESEARCHER,
                    "深入研究指定主题，收集全面准确的信息",
                    "你是一位经验丰富的技术研究员，擅长从多个角度深入分析技术主题。你有着敏锐的洞察力，能够发现主题的核心要点和发展趋势。",
                )
                .with_tool(TopicSearch),
            )
            .with_agent(CrewAgent::new(
                WRITER,
                "创作高质量、结构清晰的技术文章",
                "你是一位专业的技术写作专家，擅长将复杂的技术概念转化为易懂的文章。你特别善于为不同的读者群体调整写作风格和深度。",
            ))
            .with_agent(
                CrewAgent::new(
                    ANALYST,
                    "分析内容质量，提供专业的改进建议",
                    "你是一位严谨的内容质量分析师，擅长评估技术内容的准确性、完整性和可读性。你的分析总是客观、详细、有建设性。",
                )
                .with_tool(TextAnalysis),
            )
            .with_agent(
                CrewAgent::new(
                    COORDINATOR,
                    "协调团队工作，确保项目按计划高质量完成",
                    "你是一位经验丰富的项目协调员，擅长管理复杂的协作项目。你总是关注项目的整体目标，确保最终交付物符合要求。",
                )
                .with_delegation(true),
            );

        let tasks = vec![
            CrewTask::new(
                &format!(
                    "对主题\"{}\"进行深入研究。\n具体要求：\n1. 搜集该主题的核心概念和定义\n2. 分析技术背景和发展历程\n3. 识别关键技术特点和优势\n4. 研究当前应用场景和案例\n5. 分析未来发展趋势",
                    topic
                ),
                "全面的技术研究报告，包含核心概念、技术特点、应用场景和发展趋势",
                RESEARCHER,
            ),
            CrewTask::new(
                &format!(
                    "基于研究员的研究成果，撰写一篇关于\"{}\"的{}。\n具体要求：\n1. 文章结构清晰，逻辑严密\n2. 语言准确，表达清楚\n3. 包含实际的代码示例或应用案例\n4. 结构：引言、核心概念、技术特点、应用实践、总结",
                    topic, article_type
                ),
                "高质量的技术文章，结构清晰，内容准确，使用Markdown格式",
                WRITER,
            ),
            CrewTask::new(
                "对撰写的文章进行全面的质量分析。\n分析维度：内容准确性、结构完整性、逻辑连贯性、可读性、实用性。\n输出要求：详细的分析报告、具体的改进建议、质量评分（1-10分）、改进优先级排序",
                "详细的质量分析报告，包含具体改进建议和质量评分",
                ANALYST,
            ),
            CrewTask::new(
                "作为项目协调员，对整个研究写作项目进行总结。\n总结内容：项目执行情况、团队协作效果、最终成果评估、改进建议、项目亮点。",
                "全面的项目总结报告，包含执行情况、成果评估和改进建议",
                COORDINATOR,
            ),
        ];

        (crew, tasks)
    }
}

fn task_prompt(task: &CrewTask, previous: &[TaskOutput]) -> String {
    let mut prompt = format!(
        "任务描述：\n{}\n\n期望输出：{}\n",
        task.description, task.expected_output
    );
    if !previous.is_empty() {
        prompt.push_str("\n以下是前序任务的输出，请作为上下文参考：\n");
        for (i, output) in previous.iter().enumerate() {
            let _ = write!(
                prompt,
                "\n[任务 {} - {}]\n{}\n",
                i + 1,
                output.agent_role,
                output.output
            );
        }
    }
    prompt
}
