//! Canned weather and knowledge lookups used to demonstrate tool calling.

#[cfg(test)]
mod tests;

pub const WEATHER_NOT_FOUND: &str = "未找到该城市的天气信息";
pub const KNOWLEDGE_NOT_FOUND: &str = "抱歉，知识库中暂无相关信息";

const WEATHER: [(&str, &str); 3] = [
    ("北京", "晴天，温度25°C"),
    ("上海", "多云，温度22°C"),
    ("广州", "小雨，温度28°C"),
];

const KNOWLEDGE: [(&str, &str); 4] = [
    (
        "langchain",
        "LangChain是一个用于开发由语言模型驱动的应用程序的框架。它提供了一套工具、组件和接口，简化了创建由大型语言模型(LLM)驱动的应用程序的过程。",
    ),
    (
        "agent",
        "AI Agent是一个能够感知环境、做出决策并采取行动的智能系统。它具有自主性、反应性、主动性和社交能力等特征。",
    ),
    (
        "rag",
        "RAG（Retrieval-Augmented Generation）是一种结合了信息检索和生成式AI的技术，通过检索相关文档来增强语言模型的生成能力。",
    ),
    (
        "向量数据库",
        "向量数据库是专门用于存储和检索高维向量数据的数据库系统，常用于语义搜索、推荐系统和AI应用中。",
    ),
];

#[inline]
pub fn weather(city: &str) -> String {
    let city = city.trim();
    WEATHER
        .iter()
        .find(|(name, _)| *name == city)
        .map_or_else(|| WEATHER_NOT_FOUND.to_string(), |(_, report)| (*report).to_string())
}

/// Cities with canned weather data
#[inline]
pub fn known_cities() -> impl Iterator<Item = &'static str> {
    WEATHER.iter().map(|(name, _)| *name)
}

/// First entry whose key occurs in the query, case-insensitively
#[inline]
pub fn knowledge_search(query: &str) -> String {
    let query = query.to_lowercase();
    KNOWLEDGE
        .iter()
        .find(|(key, _)| query.contains(&key.to_lowercase()))
        .map_or_else(
            || KNOWLEDGE_NOT_FOUND.to_string(),
            |(key, text)| format!("关于{}的信息：{}", key, text),
        )
}
