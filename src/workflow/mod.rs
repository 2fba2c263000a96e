//! Article-writing workflow.
//!
//! An explicit state machine over [`ArticleState`]: each [`Node`] updates the
//! state and names its successor. The quality gate loops through revision at
//! most [`MAX_REVISIONS`] times before the article is finalized.


use crate::llm::ChatModel;
use crate::{LabError, Result};
use clap::ValueEnum;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_REVISIONS: u32 = 2;
pub const MIN_ARTICLE_CHARS: usize = 500;
pub const DEFAULT_WORKFLOW_TEMPERATURE: f32 = 0.7;

const MAX_OUTLINE_SECTIONS: usize = 6;
const RESEARCH_NOTE_CHARS: usize = 200;
const QUALITY_SAMPLE_CHARS: usize = 500;
const MODEL_SUGGESTIONS: usize = 2;
const DEFAULT_OUTLINE: [&str; 4] = ["引言", "主要内容", "深入分析", "总结"];
const WRITER_SYSTEM_PROMPT: &str = "你是一位经验丰富的中文写作助手，擅长撰写结构清晰、内容充实的文章。";

const MERMAID: &str = "graph TD
    analyze_requirements --> create_outline
    create_outline --> research_topic
    research_topic --> write_sections
    write_sections --> combine_draft
    combine_draft --> quality_check
    quality_check -.->|revise| revise_article
    quality_check -.->|finalize| finalize_article
    revise_article --> quality_check
    finalize_article --> END";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ArticleType {
    #[default]
    Blog,
    Tutorial,
    News,
}

impl ArticleType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Tutorial => "tutorial",
            Self::News => "news",
        }
    }

    /// Review criteria and the score each must reach, handed to the quality
    /// gate's reviewer
    #[inline]
    pub fn quality_thresholds(self) -> [(&'static str, f32); 2] {
        match self {
            Self::Blog => [("engagement", 0.7), ("originality", 0.8)],
            Self::Tutorial => [("clarity", 0.8), ("completeness", 0.9)],
            Self::News => [("accuracy", 0.9), ("timeliness", 0.8)],
        }
    }
}

impl fmt::Display for ArticleType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityChecks {
    /// Draft longer than [`MIN_ARTICLE_CHARS`]
    pub length: bool,
    /// Every outline section appears in the draft
    pub structure: bool,
    /// Revised at least once
    pub revision: bool,
}

impl QualityChecks {
    #[inline]
    pub fn all_passed(&self) -> bool {
        self.length && self.structure && self.revision
    }

    fn entries(&self) -> [(&'static str, bool); 3] {
        [
            ("length", self.length),
            ("structure", self.structure),
            ("revision", self.revision),
        ]
    }
}

/// Everything the workflow knows about the article being written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleState {
    pub topic: String,
    pub article_type: ArticleType,
    pub audience: String,
    /// Set from the article type during requirements analysis
    pub quality_thresholds: Vec<(&'static str, f32)>,
    pub outline: Vec<String>,
    pub research_notes: Vec<String>,
    /// Section title and body, in outline order
    pub draft_sections: Vec<(String, String)>,
    pub title: String,
    pub current_draft: String,
    pub quality_checks: QualityChecks,
    pub revision_suggestions: Vec<String>,
    pub revision_count: u32,
    pub steps: Vec<String>,
    pub is_complete: bool,
}

impl ArticleState {
    #[inline]
    pub fn new(topic: &str, article_type: ArticleType, audience: &str) -> Self {
        Self {
            topic: topic.to_string(),
            article_type,
            audience: audience.to_string(),
            ..Self::default()
        }
    }

    /// Execution summary, steps, an article preview and the outline
    #[inline]
    pub fn report(&self, preview_chars: usize) -> String {
        let mut out = String::from("📊 执行统计：\n");
        let _ = writeln!(out, "  - 执行步骤：{}", self.steps.len());
        let _ = writeln!(out, "  - 修订次数：{}", self.revision_count);
        let _ = writeln!(out, "  - 是否完成：{}", if self.is_complete { "是" } else { "否" });

        out.push_str("\n📋 执行过程：\n");
        for step in &self.steps {
            let _ = writeln!(out, "  ✓ {}", step);
        }

        out.push_str("\n📄 最终文章预览：\n");
        let _ = writeln!(out, "{}", "-".repeat(60));
        let total = self.current_draft.chars().count();
        if total > preview_chars {
            let head: String = self.current_draft.chars().take(preview_chars).collect();
            let _ = writeln!(out, "{}...", head);
        } else {
            let _ = writeln!(out, "{}", self.current_draft);
        }

        out.push_str("\n📑 文章结构：\n");
        for (i, section) in self.outline.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, section);
        }
        out
    }
}

/// Workflow nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    AnalyzeRequirements,
    CreateOutline,
    ResearchTopic,
    WriteSections,
    CombineDraft,
    QualityCheck,
    ReviseArticle,
    FinalizeArticle,
}

impl Node {
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::AnalyzeRequirements => "analyze_requirements",
            Self::CreateOutline => "create_outline",
            Self::ResearchTopic => "research_topic",
            Self::WriteSections => "write_sections",
            Self::CombineDraft => "combine_draft",
            Self::QualityCheck => "quality_check",
            Self::ReviseArticle => "revise_article",
            Self::FinalizeArticle => "finalize_article",
        }
    }
}

/// Branch taken after the quality gate
#[inline]
pub fn quality_router(state: &ArticleState) -> Node {
    if !state.revision_suggestions.is_empty() && state.revision_count < MAX_REVISIONS {
        Node::ReviseArticle
    } else {
        Node::FinalizeArticle
    }
}

pub struct ArticleWorkflow {
    model: Arc<dyn ChatModel>,
    temperature: f32,
}

impl ArticleWorkflow {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            temperature: DEFAULT_WORKFLOW_TEMPERATURE,
        }
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Mermaid rendering of the graph
    #[inline]
    pub fn mermaid() -> &'static str {
        MERMAID
    }

    /// Run every node from requirements analysis to the finished article
    #[inline]
    pub fn write_article(
        &self,
        topic: &str,
        article_type: ArticleType,
        audience: &str,
    ) -> Result<ArticleState> {
        if topic.trim().is_empty() {
            return Err(LabError::Config("Article topic must not be empty".to_string()));
        }

        let mut state = ArticleState::new(topic, article_type, audience);
        let mut node = Some(Node::AnalyzeRequirements);
        while let Some(current) = node {
            debug!("Workflow entering {}", current.name());
            node = self.step(current, &mut state)?;
        }

        info!(
            "Workflow finished '{}' after {} steps and {} revision(s)",
            state.topic,
            state.steps.len(),
            state.revision_count
        );
        Ok(state)
    }

    /// Apply one node to `state` and return the node to run next
    #[inline]
    pub fn step(&self, node: Node, state: &mut ArticleState) -> Result<Option<Node>> {
        let next = match node {
            Node::AnalyzeRequirements => {
                Self::analyze_requirements(state);
                Node::CreateOutline
            }
            Node::CreateOutline => {
                self.create_outline(state)?;
                Node::ResearchTopic
            }
            Node::ResearchTopic => {
                self.research_topic(state)?;
                Node::WriteSections
            }
            Node::WriteSections => {
                self.write_sections(state)?;
                Node::CombineDraft
            }
            Node::CombineDraft => {
                self.combine_draft(state)?;
                Node::QualityCheck
            }
            Node::QualityCheck => {
                self.quality_check(state)?;
                quality_router(state)
            }
            Node::ReviseArticle => {
                self.revise_article(state)?;
                Node::QualityCheck
            }
            Node::FinalizeArticle => {
                state.is_complete = true;
                state.steps.push("文章定稿完成".to_string());
                return Ok(None);
            }
        };
        Ok(Some(next))
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        self.model
            .complete(WRITER_SYSTEM_PROMPT, prompt, self.temperature)
            .map_err(|e| LabError::Llm(format!("{:#}", e)))
    }

    fn analyze_requirements(state: &mut ArticleState) {
        info!(
            "Analyzing requirements: topic={}, type={}, audience={}",
            state.topic, state.article_type, state.audience
        );
        state.quality_thresholds = state.article_type.quality_thresholds().to_vec();
        state.quality_checks = QualityChecks::default();
        state.revision_count = 0;
        state.is_complete = false;
        state.steps.push("需求分析完成".to_string());
    }

    fn create_outline(&self, state: &mut ArticleState) -> Result<()> {
        let prompt = format!(
            "为以下主题创建一个{}类型文章的大纲：\n\n主题：{}\n目标读者：{}\n\n请创建一个包含4-6个主要部分的大纲，每个部分用一句话描述。\n输出格式：\n1. 部分标题 - 简短描述\n2. 部分标题 - 简短描述\n...",
            state.article_type, state.topic, state.audience
        );
        let reply = self.ask(&prompt)?;

        let mut outline = parse_outline(&reply);
        if outline.is_empty() {
            debug!("Outline reply had no list items, using the default outline");
            outline = DEFAULT_OUTLINE.iter().map(|s| (*s).to_string()).collect();
        }
        info!("Outline has {} sections", outline.len());

        state.outline = outline;
        state.steps.push("大纲创建完成".to_string());
        Ok(())
    }

    fn research_topic(&self, state: &mut ArticleState) -> Result<()> {
        for section in &state.outline {
            let prompt = format!(
                "为文章部分\"{}\"提供相关的要点和信息。\n主题：{}\n\n请提供2-3个关键要点。",
                section, state.topic
            );
            let reply = self.ask(&prompt)?;
            let head: String = reply.chars().take(RESEARCH_NOTE_CHARS).collect();
            state.research_notes.push(format!("[{}] {}...", section, head));
            debug!("Researched section {}", section);
        }
        state.steps.push("主题研究完成".to_string());
        Ok(())
    }

    fn write_sections(&self, state: &mut ArticleState) -> Result<()> {
        let mut sections = Vec::with_capacity(state.outline.len());
        for section in &state.outline {
            let marker = format!("[{}]", section);
            let notes: Vec<&str> = state
                .research_notes
                .iter()
                .filter(|note| note.starts_with(&marker))
                .map(String::as_str)
                .collect();
            let notes = if notes.is_empty() {
                "无".to_string()
            } else {
                notes.join("\n")
            };

            let prompt = format!(
                "撰写文章的\"{}\"部分。\n\n文章主题：{}\n文章类型：{}\n目标读者：{}\n\n参考信息：\n{}\n\n请撰写200-300字的内容。",
                section, state.topic, state.article_type, state.audience, notes
            );
            sections.push((section.clone(), self.ask(&prompt)?));
            debug!("Wrote section {}", section);
        }
        state.draft_sections = sections;
        state.steps.push("各部分撰写完成".to_string());
        Ok(())
    }

    fn combine_draft(&self, state: &mut ArticleState) -> Result<()> {
        let prompt = format!(
            "为关于'{}'的{}创建一个吸引人的标题：",
            state.topic, state.article_type
        );
        let title = clean_title(&self.ask(&prompt)?);
        let title = if title.is_empty() {
            state.topic.clone()
        } else {
            title
        };

        let mut parts = vec![format!("# {}\n", title)];
        for (section, content) in &state.draft_sections {
            parts.push(format!("\n## {}\n", section));
            parts.push(content.clone());
        }
        if state.article_type == ArticleType::Tutorial {
            parts.push("\n## 下一步\n".to_string());
            parts.push("希望这个教程对你有帮助！如果有问题，欢迎留言讨论。".to_string());
        }

        state.title = title;
        state.current_draft = parts.join("\n");
        info!(
            "Draft combined, {} characters",
            state.current_draft.chars().count()
        );
        state.steps.push("文章组合完成".to_string());
        Ok(())
    }

    fn quality_check(&self, state: &mut ArticleState) -> Result<()> {
        let draft = &state.current_draft;
        let checks = QualityChecks {
            length: draft.chars().count() > MIN_ARTICLE_CHARS,
            structure: state.outline.iter().all(|section| draft.contains(section.as_str())),
            revision: state.revision_count > 0,
        };

        let mut suggestions = Vec::new();
        if !checks.length {
            suggestions.push("文章过短，需要扩充内容".to_string());
        }
        if !checks.structure {
            suggestions.push("部分章节缺失，需要补充".to_string());
        }

        if state.revision_count < MAX_REVISIONS {
            let sample: String = draft.chars().take(QUALITY_SAMPLE_CHARS).collect();
            let criteria = state
                .article_type
                .quality_thresholds()
                .iter()
                .map(|(name, score)| format!("{} ≥ {:.1}", name, score))
                .collect::<Vec<_>>()
                .join("，");
            let prompt = format!(
                "评估以下文章草稿，提供1-2个具体的改进建议：\n评估标准（{}）：{}\n\n{}...\n\n改进建议：",
                state.article_type, criteria, sample
            );
            let reply = self.ask(&prompt)?;
            suggestions.extend(
                reply
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .take(MODEL_SUGGESTIONS)
                    .map(str::to_string),
            );
        }

        for (name, passed) in checks.entries() {
            debug!("Quality check {}: {}", name, if passed { "pass" } else { "fail" });
        }

        state.quality_checks = checks;
        state.revision_suggestions = suggestions;
        state.steps.push("质量检查完成".to_string());
        Ok(())
    }

    fn revise_article(&self, state: &mut ArticleState) -> Result<()> {
        let suggestions = state
            .revision_suggestions
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "请根据以下建议修改文章：\n\n修改建议：\n{}\n\n原文章：\n{}\n\n请提供修改后的完整文章。",
            suggestions, state.current_draft
        );
        let revised = self.ask(&prompt)?;

        state.revision_count += 1;
        if !revised.is_empty() {
            state.current_draft = revised;
        }
        state.revision_suggestions.clear();
        info!("Revision {} complete", state.revision_count);
        state
            .steps
            .push(format!("第{}次修改完成", state.revision_count));
        Ok(())
    }
}

/// Section titles from a numbered or bulleted outline reply.
///
/// Only list items count; each keeps the text before its ` - ` description.
#[inline]
pub fn parse_outline(reply: &str) -> Vec<String> {
    reply
        .lines()
        .filter_map(|line| strip_list_marker(line.trim()))
        .map(|item| {
            let title = item
                .split_once(" - ")
                .or_else(|| item.split_once(" — "))
                .or_else(|| item.split_once('：'))
                .map_or(item, |(title, _)| title);
            title.trim().trim_matches('*').trim().to_string()
        })
        .filter(|title| !title.is_empty())
        .take(MAX_OUTLINE_SECTIONS)
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest);
        }
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = line.get(digits..)?;
    ['.', '、', ')', '）']
        .iter()
        .find_map(|marker| rest.strip_prefix(*marker))
        .map(str::trim_start)
}

fn clean_title(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '《' | '》'))
        .trim()
        .to_string()
}
