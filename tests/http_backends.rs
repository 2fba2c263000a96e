#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Agent and knowledge base against mocked OpenAI-compatible and Ollama
//! endpoints.

use agent_lab::agent::Agent;
use agent_lab::config::{Config, LlmConfig, OllamaConfig};
use agent_lab::database::Metadata;
use agent_lab::embeddings::{Embedder, OllamaClient};
use agent_lab::llm::{ChatModel, OpenAiClient};
use agent_lab::rag::KnowledgeBase;
use agent_lab::tools::ToolRegistry;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSION: usize = 64;
const KEYWORDS: [&str; 4] = ["rust", "python", "向量", "agent"];

/// Deterministic keyword-count embeddings, shaped like Ollama's `/api/embed`
struct KeywordEmbeddings;

fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut vector = vec![0.0_f32; DIMENSION];
    for (slot, keyword) in KEYWORDS.iter().enumerate() {
        vector[slot] = lowered.matches(keyword).count() as f32;
    }
    vector[DIMENSION - 1] = 0.1;
    vector
}

impl Respond for KeywordEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("json body");
        let inputs: Vec<String> = match &body["input"] {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let embeddings: Vec<Vec<f32>> = inputs.iter().map(|t| keyword_vector(t)).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    }))
}

fn chat_client(server: &MockServer) -> Arc<dyn ChatModel> {
    let config = LlmConfig {
        api_base: format!("{}/v1", server.uri()),
        ..LlmConfig::default()
    };
    Arc::new(OpenAiClient::new(&config, "sk-test").expect("client builds"))
}

fn lab_config(home: &TempDir, ollama: &MockServer) -> Config {
    let address = ollama.address();
    Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: address.ip().to_string(),
            port: address.port(),
            model: "nomic-embed-text".to_string(),
            batch_size: 8,
            embedding_dimension: DIMENSION as u32,
            ..OllamaConfig::default()
        },
        base_dir: home.path().to_path_buf(),
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn agent_calls_calculator_then_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "Calculator", "arguments": "{\"expression\": \"25*4\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("计算结果: 100"))
        .respond_with(completion("25乘以4等于100。"))
        .expect(1)
        .mount(&server)
        .await;

    let model = chat_client(&server);
    let outcome = tokio::task::spawn_blocking(move || {
        Agent::new(model, ToolRegistry::with_default_tools()).run("25乘以4是多少？")
    })
    .await
    .expect("task joins")
    .expect("agent runs");

    assert_eq!(outcome.answer, "25乘以4等于100。");
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.steps.len(), 1);
    assert_eq!(outcome.steps[0].input, "25*4");
    assert_eq!(outcome.steps[0].output, "计算结果: 100");
}

#[tokio::test(flavor = "multi_thread")]
async fn knowledge_base_ingests_searches_and_answers() {
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbeddings)
        .mount(&ollama)
        .await;

    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Rust 拥有所有权系统"))
        .respond_with(completion("Rust 通过所有权保证内存安全。"))
        .expect(1)
        .mount(&llm)
        .await;

    let home = TempDir::new().expect("tempdir");
    let config = lab_config(&home, &ollama);
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaClient::new(&config.ollama).expect("ollama client"));
    let kb = KnowledgeBase::from_config(&config, embedder, Some(chat_client(&llm)))
        .await
        .expect("knowledge base opens");

    let notes = home.path().join("rust.md");
    std::fs::write(&notes, "Rust 拥有所有权系统，rust 没有垃圾回收。").expect("write");
    let added = kb
        .add_file(&notes, Metadata::new())
        .await
        .expect("file added");
    assert!(added.starts_with("✅ 成功添加文档，共生成 1 个文本块"));

    let added = kb
        .add_document("Python 是一门脚本语言。", Metadata::new(), 500, 50)
        .await
        .expect("document added");
    assert!(added.starts_with("✅"));

    let hits = kb.search("rust", 1, None, true).await.expect("search");
    assert!(hits.starts_with("🔍 找到 1 个相关文档"));
    assert!(hits.contains("所有权"));

    let answer = kb
        .answer_question("rust 如何管理内存？", 1, true, 0.1)
        .await
        .expect("answer");
    assert!(answer.contains("Rust 通过所有权保证内存安全。"));
    assert!(answer.contains("📚 **信息来源** (基于 1 个相关文档)"));

    let stats = kb.stats().await.expect("stats");
    assert!(stats.contains("  - 总文档块数: 2"));
    assert!(stats.contains("  - .md: 1 块 (50.0%)"));
    assert!(stats.contains("  - 嵌入模型: nomic-embed-text"));
    assert!(stats.contains(&format!("  - 向量维度: {}", DIMENSION)));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_ollama_is_an_embedding_error() {
    let home = TempDir::new().expect("tempdir");
    let ollama = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&ollama)
        .await;

    let config = lab_config(&home, &ollama);
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaClient::new(&config.ollama).expect("ollama client"));
    let kb = KnowledgeBase::from_config(&config, embedder, None)
        .await
        .expect("knowledge base opens");

    let err = kb
        .add_document("rust", Metadata::new(), 500, 50)
        .await
        .expect_err("embedding fails");
    assert!(matches!(err, agent_lab::LabError::Embedding(_)));
}
