//! Tools the agent can call, and the registry that dispatches them by name.


pub mod calculator;
pub mod mock;

use crate::llm::ToolSpec;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the arguments object the model is asked to produce.
    fn parameters(&self) -> Value;
    fn call(&self, input: &str) -> String;
}

pub(crate) fn single_string_schema(field: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            field: { "type": "string", "description": description }
        },
        "required": [field]
    })
}

pub struct Calculator;

impl Tool for Calculator {
    #[inline]
    fn name(&self) -> &str {
        "Calculator"
    }

    #[inline]
    fn description(&self) -> &str {
        "用于数学计算。输入应该是一个数学表达式，例如 '2+3*4'"
    }

    #[inline]
    fn parameters(&self) -> Value {
        single_string_schema("expression", "The arithmetic expression to evaluate")
    }

    #[inline]
    fn call(&self, input: &str) -> String {
        calculator::calculate(input)
    }
}

pub struct WeatherQuery;

impl Tool for WeatherQuery {
    #[inline]
    fn name(&self) -> &str {
        "WeatherQuery"
    }

    #[inline]
    fn description(&self) -> &str {
        "查询指定城市的天气信息。输入应该是城市名称，例如 '北京'"
    }

    #[inline]
    fn parameters(&self) -> Value {
        single_string_schema("city", "City name, e.g. 北京")
    }

    #[inline]
    fn call(&self, input: &str) -> String {
        mock::weather(input)
    }
}

pub struct KnowledgeSearch;

impl Tool for KnowledgeSearch {
    #[inline]
    fn name(&self) -> &str {
        "KnowledgeSearch"
    }

    #[inline]
    fn description(&self) -> &str {
        "搜索知识库中的相关信息。输入应该是搜索关键词"
    }

    #[inline]
    fn parameters(&self) -> Value {
        single_string_schema("query", "Search keywords")
    }

    #[inline]
    fn call(&self, input: &str) -> String {
        mock::knowledge_search(input)
    }
}

/// Name-keyed tool set that preserves registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Calculator);
        registry.register(WeatherQuery);
        registry.register(KnowledgeSearch);
        registry
    }

    /// Register a tool, replacing any existing tool with the same name in place.
    #[inline]
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            debug!("Replacing tool {}", tool.name());
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[inline]
    pub fn to_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec::function(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Run a tool by name, or `None` when no such tool is registered.
    #[inline]
    pub fn call(&self, name: &str, input: &str) -> Option<String> {
        let tool = self.get(name)?;
        info!(target: "tool", "{}({})", name, input);
        let output = tool.call(input);
        debug!(target: "tool", "{} -> {}", name, output);
        Some(output)
    }

    /// Extract the single string input for `name` from model-supplied JSON
    /// arguments.
    ///
    /// A bare JSON string is used as-is. For an object, the field named after
    /// the tool's first schema property wins, then any lone string field.
    /// Anything else is passed through as raw text.
    #[inline]
    pub fn resolve_input(&self, name: &str, arguments: &str) -> String {
        let Ok(value) = serde_json::from_str::<Value>(arguments) else {
            return arguments.to_string();
        };

        match value {
            Value::String(s) => s,
            Value::Object(map) => {
                let preferred = self.get(name).and_then(|tool| {
                    tool.parameters()
                        .get("properties")
                        .and_then(Value::as_object)
                        .and_then(|props| props.keys().next().cloned())
                });

                if let Some(text) = preferred
                    .and_then(|key| map.get(&key).cloned())
                    .and_then(|v| value_to_input(&v))
                {
                    return text;
                }

                let mut strings = map.values().filter_map(Value::as_str);
                match (strings.next(), strings.next()) {
                    (Some(only), None) => only.to_string(),
                    _ => Value::Object(map).to_string(),
                }
            }
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }
}

fn value_to_input(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
