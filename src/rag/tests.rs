use super::*;
use crate::embeddings::fake::CharBagEmbedder;
use crate::llm::fake::{FnModel, ScriptedModel};
use serde_json::json;
use tempfile::TempDir;

const DIM: usize = 32;

fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

async fn open_kb(dir: &TempDir, model: Option<Arc<dyn ChatModel>>) -> KnowledgeBase {
    KnowledgeBase::open(dir.path(), Arc::new(CharBagEmbedder::new(DIM)), model)
        .await
        .expect("should open knowledge base")
}

async fn seeded(dir: &TempDir, model: Option<Arc<dyn ChatModel>>) -> KnowledgeBase {
    let kb = open_kb(dir, model).await;
    kb.add_document(
        "aaaa abab baba",
        metadata(json!({"source": "letters.txt", "topic": "letters"})),
        500,
        50,
    )
    .await
    .expect("add letters");
    kb.add_document(
        "向量数据库存储嵌入",
        metadata(json!({"source": "vectors.md", "topic": "db"})),
        500,
        50,
    )
    .await
    .expect("add chinese");
    kb
}

#[tokio::test]
async fn add_document_reports_chunks() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    let report = kb
        .add_document("hello world", metadata(json!({"title": "greeting"})), 500, 50)
        .await
        .expect("add succeeds");

    assert!(report.starts_with("✅ 成功添加文档，共生成 1 个文本块"));
    assert!(report.contains("📊 平均块大小: 11 字符"));
    assert!(report.contains("greeting"));
    assert_eq!(kb.vectors().count().await.expect("count"), 1);
    assert_eq!(kb.database().count_chunks().await.expect("count"), 1);

    let chunk = &kb.database().all_chunks().await.expect("chunks")[0];
    let stored = chunk.metadata_map();
    assert_eq!(stored.get("chunk_index"), Some(&json!(0)));
    assert_eq!(stored.get("total_chunks"), Some(&json!(1)));
    assert_eq!(stored.get("chunk_size"), Some(&json!(11)));
    assert_eq!(stored.get("title"), Some(&json!("greeting")));
}

#[tokio::test]
async fn add_document_rejects_blank_content() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    let report = kb
        .add_document("   \n ", Metadata::new(), 500, 50)
        .await
        .expect("returns a message");
    assert_eq!(report, "错误：文档内容不能为空");
    assert_eq!(kb.vectors().count().await.expect("count"), 0);
}

#[tokio::test]
async fn add_document_rejects_bad_chunking() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    let result = kb.add_document("text", Metadata::new(), 10, 10).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn add_file_attaches_file_metadata() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;
    let path = dir.path().join("notes.md");
    std::fs::write(&path, "RAG combines retrieval and generation").expect("write file");

    let report = kb
        .add_file(&path, metadata(json!({"tag": "intro"})))
        .await
        .expect("add file");
    assert!(report.starts_with("✅ 成功添加文档"));

    let stored = kb.database().all_chunks().await.expect("chunks")[0].metadata_map();
    assert_eq!(stored.get("filename"), Some(&json!("notes.md")));
    assert_eq!(stored.get("file_extension"), Some(&json!(".md")));
    assert_eq!(stored.get("file_size"), Some(&json!(37)));
    assert_eq!(stored.get("tag"), Some(&json!("intro")));
    assert_eq!(
        stored.get("source"),
        Some(&json!(path.display().to_string()))
    );
}

#[tokio::test]
async fn add_file_reports_path_problems() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    let missing = dir.path().join("missing.txt");
    let report = kb.add_file(&missing, Metadata::new()).await.expect("message");
    assert_eq!(report, format!("错误：文件不存在 - {}", missing.display()));

    let report = kb.add_file(dir.path(), Metadata::new()).await.expect("message");
    assert_eq!(report, format!("错误：{} 不是文件", dir.path().display()));

    let binary = dir.path().join("latin1.txt");
    std::fs::write(&binary, [0x63, 0x61, 0x66, 0xe9]).expect("write bytes");
    let report = kb.add_file(&binary, Metadata::new()).await.expect("message");
    assert!(report.starts_with("文件编码错误："));
    assert!(report.contains("gbk, latin1"));
}

#[tokio::test]
async fn search_returns_closest_first() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;

    let output = kb.search("abba", 2, None, true).await.expect("search");
    assert!(output.starts_with("🔍 找到 2 个相关文档 (查询: 'abba'):\n\n"));

    let first = output.find("aaaa abab baba").expect("letters hit");
    let second = output.find("向量数据库存储嵌入").expect("chinese hit");
    assert!(first < second);
    assert!(output.contains("[文档 1] (相似度: "));
    assert!(output.contains(&"-".repeat(60)));
}

#[tokio::test]
async fn search_without_scores_omits_similarity() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;

    let output = kb.search("abba", 1, None, false).await.expect("search");
    assert!(output.contains("[文档 1]\n"));
    assert!(!output.contains("相似度"));
}

#[tokio::test]
async fn search_respects_filter() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;

    let filter = MetadataFilter::new().with("topic", "db").expect("valid filter");
    let output = kb
        .search("abba", 5, Some(&filter), false)
        .await
        .expect("search");
    assert!(output.starts_with("🔍 找到 1 个相关文档"));
    assert!(output.contains("向量数据库存储嵌入"));

    let nothing = MetadataFilter::new().with("topic", "none").expect("valid filter");
    let output = kb
        .search("abba", 5, Some(&nothing), false)
        .await
        .expect("search");
    assert_eq!(output, "没有找到相关文档");
}

#[tokio::test]
async fn search_edge_cases() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    assert_eq!(
        kb.search("  ", 5, None, false).await.expect("message"),
        "错误：搜索查询不能为空"
    );
    assert_eq!(
        kb.search("anything", 5, None, false).await.expect("message"),
        "没有找到相关文档"
    );
}

#[tokio::test]
async fn search_truncates_long_content() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;
    let long = "x".repeat(300);
    kb.add_document(&long, Metadata::new(), 500, 50)
        .await
        .expect("add");

    let output = kb.search("x", 1, None, false).await.expect("search");
    assert!(output.contains(&format!("内容: {}...", "x".repeat(200))));
}

#[tokio::test]
async fn answer_question_uses_context() {
    let dir = TempDir::new().expect("temp dir");
    let model = Arc::new(FnModel(|prompt: &str| {
        if prompt.contains("[上下文 1]: aaaa abab baba") {
            "字母文档".to_string()
        } else {
            "不知道".to_string()
        }
    }));
    let kb = seeded(&dir, Some(model)).await;

    let answer = kb
        .answer_question("abba", 1, true, 0.1)
        .await
        .expect("answer");
    assert!(answer.starts_with("🤖 **回答**\n\n字母文档\n\n"));
    assert!(answer.contains("📚 **信息来源** (基于 1 个相关文档):"));
    assert!(answer.contains("  1. letters.txt (相似度: "));
    assert!(answer.contains("  - 查询问题: abba"));
    assert!(answer.contains("  - 回答温度: 0.1"));
}

#[tokio::test]
async fn answer_question_prompt_and_sources_toggle() {
    let dir = TempDir::new().expect("temp dir");
    let model = Arc::new(ScriptedModel::new(Vec::new()).with_fallback("答案"));
    let kb = seeded(&dir, Some(Arc::clone(&model) as Arc<dyn ChatModel>)).await;

    let answer = kb
        .answer_question("向量", 3, false, 0.5)
        .await
        .expect("answer");
    assert!(!answer.contains("信息来源"));
    assert!(answer.contains("  - 检索到的文档数量: 2"));

    let prompt = model.last_prompt();
    let user = prompt.last().map(|m| m.text().to_string()).unwrap_or_default();
    assert!(user.starts_with("基于以下上下文信息回答问题。"));
    assert!(user.contains("问题：向量"));
}

#[tokio::test]
async fn answer_question_edge_cases() {
    let dir = TempDir::new().expect("temp dir");
    let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel::new(Vec::new()));
    let kb = open_kb(&dir, Some(model)).await;

    assert_eq!(
        kb.answer_question("", 3, true, 0.1).await.expect("message"),
        "错误：问题不能为空"
    );
    assert_eq!(
        kb.answer_question("anything", 3, true, 0.1)
            .await
            .expect("message"),
        "❌ 知识库中没有找到相关信息来回答这个问题"
    );
}

#[tokio::test]
async fn answer_question_requires_model() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;

    let result = kb.answer_question("abba", 3, true, 0.1).await;
    assert!(matches!(result, Err(LabError::Llm(_))));
}

#[tokio::test]
async fn list_documents_groups_by_source() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;
    assert_eq!(kb.list_documents(10, None).await.expect("list"), "知识库为空");

    kb.add_document(
        "alpha beta gamma delta epsilon zeta eta theta",
        metadata(json!({"source": "greek.txt"})),
        10,
        0,
    )
    .await
    .expect("add");
    kb.add_document("short note", metadata(json!({"source": "note.txt"})), 500, 50)
        .await
        .expect("add");

    let output = kb.list_documents(50, None).await.expect("list");
    assert!(output.contains("📄 **greek.txt**"));
    assert!(output.contains("📄 **note.txt** (1 个文档块)"));
    assert!(output.contains("  1. [块 1/"));
    assert!(output.contains("个块\n"));
    assert!(output.contains("  - 不同来源数: 2"));

    let filter = MetadataFilter::new()
        .with("source", "note.txt")
        .expect("valid filter");
    let output = kb.list_documents(50, Some(&filter)).await.expect("list");
    assert!(output.starts_with("📚 知识库文档列表 (显示前 1 个):"));
    assert!(!output.contains("greek.txt"));
}

#[tokio::test]
async fn delete_documents_requires_confirmation_and_filter() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;
    let filter = MetadataFilter::new().with("topic", "db").expect("valid filter");

    assert_eq!(
        kb.delete_documents(Some(&filter), false).await.expect("message"),
        "❌ 删除操作需要确认。请设置 confirm=true"
    );
    assert_eq!(
        kb.delete_documents(None, true).await.expect("message"),
        "❌ 删除操作需要提供过滤条件以确保安全"
    );
    assert_eq!(
        kb.delete_documents(Some(&MetadataFilter::new()), true)
            .await
            .expect("message"),
        "❌ 删除操作需要提供过滤条件以确保安全"
    );
    assert_eq!(kb.vectors().count().await.expect("count"), 2);
}

#[tokio::test]
async fn delete_documents_removes_from_both_stores() {
    let dir = TempDir::new().expect("temp dir");
    let kb = seeded(&dir, None).await;

    let filter = MetadataFilter::new().with("topic", "db").expect("valid filter");
    let report = kb
        .delete_documents(Some(&filter), true)
        .await
        .expect("delete");
    assert!(report.starts_with("✅ 成功删除 1 个文档\n删除条件: "));

    assert_eq!(kb.vectors().count().await.expect("count"), 1);
    assert_eq!(kb.database().count_chunks().await.expect("count"), 1);
    assert_eq!(kb.database().list_documents().await.expect("docs").len(), 1);

    let found = kb.search("向量数据库", 5, None, false).await.expect("search");
    assert!(!found.contains("向量数据库存储嵌入"));
    assert!(found.contains("aaaa abab baba"));
    let listed = kb.list_documents(50, None).await.expect("list");
    assert!(!listed.contains("vectors.md"));
    assert!(listed.contains("letters.txt"));

    let again = kb
        .delete_documents(Some(&filter), true)
        .await
        .expect("delete");
    assert!(again.starts_with("没有找到匹配条件的文档: "));
}

#[tokio::test]
async fn stats_reports_distribution() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;
    assert_eq!(
        kb.stats().await.expect("stats"),
        "📊 知识库统计信息\n\n❌ 知识库为空"
    );

    let path = dir.path().join("guide.md");
    std::fs::write(&path, "agent tools memory").expect("write file");
    kb.add_file(&path, Metadata::new()).await.expect("add file");
    kb.add_document("plain text", Metadata::new(), 500, 50)
        .await
        .expect("add");

    let stats = kb.stats().await.expect("stats");
    assert!(stats.contains("  - 总文档块数: 2"));
    assert!(stats.contains("  - 最大块大小: 18 字符"));
    assert!(stats.contains("  - 最小块大小: 10 字符"));
    assert!(stats.contains("  - 未知: 1 块 (50.0%)"));
    assert!(stats.contains("📄 **文件类型分布**\n  - .md: 1 块 (50.0%)"));
    assert!(stats.contains("  - 嵌入模型: char-bag"));
    assert!(stats.contains(&format!("  - 向量维度: {}", DIM)));
}

#[tokio::test]
async fn schema_describes_fields() {
    let dir = TempDir::new().expect("temp dir");
    let kb = open_kb(&dir, None).await;

    let schema = kb.schema();
    assert!(schema.starts_with("🗄️ **向量数据库模式信息**"));
    assert!(schema.contains(&format!("float[{}]", DIM)));
    assert!(schema.contains("• chunk_index: 块索引"));
    assert!(schema.contains("**支持的操作**"));
}

#[test]
fn thousands_groups_digits() {
    assert_eq!(thousands(0), "0");
    assert_eq!(thousands(999), "999");
    assert_eq!(thousands(1000), "1,000");
    assert_eq!(thousands(1_234_567), "1,234,567");
}
