//! Tools handed to crew members: a canned topic search and a text analyzer.

use crate::tools::{Tool, single_string_schema};
use serde_json::Value;

const SEARCH_RESULTS: [(&str, &str); 5] = [
    (
        "人工智能",
        "人工智能（AI）是计算机科学的一个分支，致力于创建能够执行通常需要人类智能的任务的系统...",
    ),
    (
        "机器学习",
        "机器学习是人工智能的一个子集，专注于算法和统计模型，使计算机系统能够从数据中学习...",
    ),
    (
        "深度学习",
        "深度学习是机器学习的一个分支，使用人工神经网络来模拟人脑的学习过程...",
    ),
    (
        "LangChain",
        "LangChain是一个开源框架，用于构建基于大型语言模型（LLM）的应用程序...",
    ),
    (
        "CrewAI",
        "CrewAI是一个多Agent协作框架，允许创建一组AI代理来协同工作完成复杂任务...",
    ),
];

const TECH_KEYWORDS: [&str; 5] = ["人工智能", "机器学习", "深度学习", "Agent", "AI"];

#[inline]
pub fn topic_search(query: &str) -> String {
    let lowered = query.to_lowercase();
    SEARCH_RESULTS
        .iter()
        .find(|(keyword, _)| lowered.contains(&keyword.to_lowercase()))
        .map_or_else(
            || format!("关于'{}'的搜索结果：这是一个相关的技术主题，需要进一步研究。", query),
            |(_, result)| format!("搜索结果：{}", result),
        )
}

/// Word, character and line counts plus technical keyword hits
#[inline]
pub fn analyze_text(text: &str) -> String {
    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    let lines = text.split('\n').count();

    let lowered = text.to_lowercase();
    let found: Vec<&str> = TECH_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| lowered.contains(&kw.to_lowercase()))
        .collect();

    let keywords = if found.is_empty() {
        "无".to_string()
    } else {
        found.join(", ")
    };
    let quality = if found.is_empty() {
        "需要更多技术细节"
    } else {
        "高质量技术内容"
    };

    format!(
        "文本分析结果：\n- 字数：{} 词\n- 字符数：{} 字符\n- 行数：{} 行\n- 技术关键词：{}\n- 内容质量：{}",
        words, chars, lines, keywords, quality
    )
}

pub struct TopicSearch;

impl Tool for TopicSearch {
    #[inline]
    fn name(&self) -> &str {
        "search_tool"
    }

    #[inline]
    fn description(&self) -> &str {
        "搜索工具 - 查询技术主题的资料摘要"
    }

    #[inline]
    fn parameters(&self) -> Value {
        single_string_schema("query", "搜索查询")
    }

    #[inline]
    fn call(&self, input: &str) -> String {
        topic_search(input)
    }
}

pub struct TextAnalysis;

impl Tool for TextAnalysis {
    #[inline]
    fn name(&self) -> &str {
        "analysis_tool"
    }

    #[inline]
    fn description(&self) -> &str {
        "文本分析工具 - 统计字数、行数并识别技术关键词"
    }

    #[inline]
    fn parameters(&self) -> Value {
        single_string_schema("text", "要分析的文本")
    }

    #[inline]
    fn call(&self, input: &str) -> String {
        analyze_text(input)
    }
}
