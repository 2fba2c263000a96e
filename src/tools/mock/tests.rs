use super::*;

#[test]
fn beijing_weather() {
    assert_eq!(weather("北京"), "晴天，温度25°C");
}

#[test]
fn surrounding_whitespace_is_ignored() {
    assert_eq!(weather("  上海\n"), "多云，温度22°C");
}

#[test]
fn unknown_city_falls_back() {
    assert_eq!(weather("深圳"), WEATHER_NOT_FOUND);
    assert_eq!(weather(""), WEATHER_NOT_FOUND);
    assert_eq!(weather("Beijing"), "未找到该城市的天气信息");
}

#[test]
fn exactly_three_cities() {
    assert_eq!(known_cities().count(), 3);
    for city in known_cities() {
        assert_ne!(weather(city), WEATHER_NOT_FOUND);
    }
}

#[test]
fn knowledge_matches_case_insensitively() {
    let result = knowledge_search("What is LangChain?");
    assert!(result.starts_with("关于langchain的信息："));

    let result = knowledge_search("介绍一下向量数据库");
    assert!(result.starts_with("关于向量数据库的信息："));
}

#[test]
fn knowledge_miss() {
    assert_eq!(knowledge_search("quantum computing"), KNOWLEDGE_NOT_FOUND);
}
