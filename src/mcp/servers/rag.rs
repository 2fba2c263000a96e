//! `rag-knowledge-base`: the knowledge base behind MCP tools and resources

use crate::database::{Metadata, MetadataFilter};
use crate::mcp::protocol::{CallToolParams, CallToolResult, Resource, ResourceContents, Tool};
use crate::mcp::server::{McpServer, ResourceHandler, ToolHandler};
use crate::rag::{
    DEFAULT_ANSWER_TEMPERATURE, DEFAULT_CONTEXT_K, DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_K,
    KnowledgeBase,
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SERVER_NAME: &str = "rag-knowledge-base";

const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RagTool {
    AddDocument,
    AddFile,
    Search,
    AnswerQuestion,
    ListDocuments,
    DeleteDocuments,
    GetStats,
}

impl RagTool {
    pub const ALL: [Self; 7] = [
        Self::AddDocument,
        Self::AddFile,
        Self::Search,
        Self::AnswerQuestion,
        Self::ListDocuments,
        Self::DeleteDocuments,
        Self::GetStats,
    ];

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::AddDocument => "add_document",
            Self::AddFile => "add_file",
            Self::Search => "search",
            Self::AnswerQuestion => "answer_question",
            Self::ListDocuments => "list_documents",
            Self::DeleteDocuments => "delete_documents",
            Self::GetStats => "get_stats",
        }
    }

    /// Prefix for knowledge base failures surfaced to the client
    fn failure_label(self) -> &'static str {
        match self {
            Self::AddDocument => "添加文档失败",
            Self::AddFile => "添加文件失败",
            Self::Search => "搜索失败",
            Self::AnswerQuestion => "回答问题失败",
            Self::ListDocuments => "列出文档失败",
            Self::DeleteDocuments => "删除文档失败",
            Self::GetStats => "获取统计信息失败",
        }
    }

    #[inline]
    pub fn definition(self) -> Tool {
        let (description, schema) = match self {
            Self::AddDocument => (
                "添加文档到知识库",
                json!({
                    "type": "object",
                    "properties": {
                        "content": {"type": "string", "description": "文档内容"},
                        "metadata": {"type": "object", "description": "文档元数据（如标题、来源、标签等）", "default": {}},
                        "chunk_size": {"type": "integer", "description": "文本分块大小", "default": DEFAULT_CHUNK_SIZE},
                        "chunk_overlap": {"type": "integer", "description": "分块重叠大小", "default": DEFAULT_CHUNK_OVERLAP}
                    },
                    "required": ["content"]
                }),
            ),
            Self::AddFile => (
                "从文件添加文档到知识库",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "文件路径"},
                        "encoding": {"type": "string", "description": "文件编码", "default": "utf-8"},
                        "metadata": {"type": "object", "description": "额外的元数据", "default": {}}
                    },
                    "required": ["file_path"]
                }),
            ),
            Self::Search => (
                "在知识库中搜索相关文档",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "搜索查询"},
                        "k": {"type": "integer", "description": "返回结果数量", "default": DEFAULT_SEARCH_K},
                        "filter": {"type": "object", "description": "元数据过滤条件"},
                        "include_scores": {"type": "boolean", "description": "是否包含相似度分数", "default": false}
                    },
                    "required": ["query"]
                }),
            ),
            Self::AnswerQuestion => (
                "基于知识库回答问题",
                json!({
                    "type": "object",
                    "properties": {
                        "question": {"type": "string", "description": "要回答的问题"},
                        "context_k": {"type": "integer", "description": "使用的上下文文档数量", "default": DEFAULT_CONTEXT_K},
                        "include_sources": {"type": "boolean", "description": "是否在回答中包含信息来源", "default": true},
                        "temperature": {"type": "number", "description": "回答的创造性（0-1）", "default": DEFAULT_ANSWER_TEMPERATURE}
                    },
                    "required": ["question"]
                }),
            ),
            Self::ListDocuments => (
                "列出知识库中的文档信息",
                json!({
                    "type": "object",
                    "properties": {
                        "limit": {"type": "integer", "description": "返回的文档数量限制", "default": DEFAULT_LIST_LIMIT},
                        "filter": {"type": "object", "description": "元数据过滤条件"}
                    }
                }),
            ),
            Self::DeleteDocuments => (
                "从知识库删除文档",
                json!({
                    "type": "object",
                    "properties": {
                        "filter": {"type": "object", "description": "删除条件（基于元数据）"},
                        "confirm": {"type": "boolean", "description": "确认删除", "default": false}
                    },
                    "required": ["filter", "confirm"]
                }),
            ),
            Self::GetStats => (
                "获取知识库统计信息",
                json!({"type": "object", "properties": {}}),
            ),
        };
        Tool::new(self.name(), description, schema)
    }
}

/// Arguments after validation, ready for the knowledge base
enum RagCall {
    AddDocument {
        content: String,
        metadata: Metadata,
        chunk_size: usize,
        chunk_overlap: usize,
    },
    AddFile {
        path: String,
        metadata: Metadata,
    },
    Search {
        query: String,
        k: usize,
        filter: Option<MetadataFilter>,
        include_scores: bool,
    },
    AnswerQuestion {
        question: String,
        context_k: usize,
        include_sources: bool,
        temperature: f32,
    },
    ListDocuments {
        limit: i64,
        filter: Option<MetadataFilter>,
    },
    DeleteDocuments {
        filter: Option<MetadataFilter>,
        confirm: bool,
    },
    GetStats,
}

fn required_str(params: &CallToolParams, key: &str) -> Result<String> {
    params
        .str_arg(key)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("缺少参数 '{}'", key))
}

fn count_arg(params: &CallToolParams, key: &str, default: usize) -> Result<usize> {
    match params.argument(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| anyhow!("参数 '{}' 必须是非负整数", key)),
    }
}

fn metadata_arg(params: &CallToolParams) -> Result<Metadata> {
    match params.argument("metadata") {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => bail!("参数 'metadata' 必须是对象"),
    }
}

fn filter_arg(params: &CallToolParams) -> Result<Option<MetadataFilter>> {
    match params.argument("filter") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(MetadataFilter::from_value(value)?)),
    }
}

impl RagCall {
    fn parse(tool: RagTool, params: &CallToolParams) -> Result<Self> {
        Ok(match tool {
            RagTool::AddDocument => Self::AddDocument {
                content: required_str(params, "content")?,
                metadata: metadata_arg(params)?,
                chunk_size: count_arg(params, "chunk_size", DEFAULT_CHUNK_SIZE)?,
                chunk_overlap: count_arg(params, "chunk_overlap", DEFAULT_CHUNK_OVERLAP)?,
            },
            RagTool::AddFile => {
                let encoding = params.str_arg("encoding").unwrap_or("utf-8");
                if !matches!(encoding.to_lowercase().as_str(), "utf-8" | "utf8") {
                    bail!("不支持的编码 {}，仅支持 utf-8", encoding);
                }
                Self::AddFile {
                    path: required_str(params, "file_path")?,
                    metadata: metadata_arg(params)?,
                }
            }
            RagTool::Search => Self::Search {
                query: required_str(params, "query")?,
                k: count_arg(params, "k", DEFAULT_SEARCH_K)?,
                filter: filter_arg(params)?,
                include_scores: params.bool_arg("include_scores").unwrap_or(false),
            },
            RagTool::AnswerQuestion => Self::AnswerQuestion {
                question: required_str(params, "question")?,
                context_k: count_arg(params, "context_k", DEFAULT_CONTEXT_K)?,
                include_sources: params.bool_arg("include_sources").unwrap_or(true),
                temperature: params
                    .argument("temperature")
                    .and_then(Value::as_f64)
                    .map_or(DEFAULT_ANSWER_TEMPERATURE, |t| t as f32),
            },
            RagTool::ListDocuments => Self::ListDocuments {
                limit: params.i64_arg("limit").unwrap_or(DEFAULT_LIST_LIMIT),
                filter: filter_arg(params)?,
            },
            RagTool::DeleteDocuments => {
                if params.argument("filter").is_none() {
                    bail!("缺少参数 'filter'");
                }
                Self::DeleteDocuments {
                    filter: filter_arg(params)?,
                    confirm: params.bool_arg("confirm").unwrap_or(false),
                }
            }
            RagTool::GetStats => Self::GetStats,
        })
    }

    async fn run(self, kb: &KnowledgeBase) -> crate::Result<String> {
        match self {
            Self::AddDocument {
                content,
                metadata,
                chunk_size,
                chunk_overlap,
            } => {
                kb.add_document(&content, metadata, chunk_size, chunk_overlap)
                    .await
            }
            Self::AddFile { path, metadata } => kb.add_file(Path::new(&path), metadata).await,
            Self::Search {
                query,
                k,
                filter,
                include_scores,
            } => kb.search(&query, k, filter.as_ref(), include_scores).await,
            Self::AnswerQuestion {
                question,
                context_k,
                include_sources,
                temperature,
            } => {
                kb.answer_question(&question, context_k, include_sources, temperature)
                    .await
            }
            Self::ListDocuments { limit, filter } => kb.list_documents(limit, filter.as_ref()).await,
            Self::DeleteDocuments { filter, confirm } => {
                kb.delete_documents(filter.as_ref(), confirm).await
            }
            Self::GetStats => kb.stats().await,
        }
    }
}

pub struct RagToolHandler {
    kb: Arc<KnowledgeBase>,
    tool: RagTool,
}

impl RagToolHandler {
    #[inline]
    pub fn new(kb: Arc<KnowledgeBase>, tool: RagTool) -> Self {
        Self { kb, tool }
    }
}

#[async_trait]
impl ToolHandler for RagToolHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let call = match RagCall::parse(self.tool, &params) {
            Ok(call) => call,
            Err(e) => {
                return Ok(CallToolResult::error(format!(
                    "错误：执行工具 {} 时出错 - {:#}",
                    self.tool.name(),
                    e
                )));
            }
        };

        debug!("Running knowledge base tool {}", self.tool.name());
        Ok(match call.run(&self.kb).await {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                warn!("{} failed: {}", self.tool.name(), e);
                CallToolResult::error(format!("{}：{}", self.tool.failure_label(), e))
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum RagResource {
    Stats,
    Schema,
}

struct RagResourceHandler {
    kb: Arc<KnowledgeBase>,
    resource: RagResource,
}

#[async_trait]
impl ResourceHandler for RagResourceHandler {
    async fn handle(&self, uri: &str) -> Result<ResourceContents> {
        let text = match self.resource {
            RagResource::Stats => self
                .kb
                .stats()
                .await
                .unwrap_or_else(|e| format!("获取统计信息失败：{}", e)),
            RagResource::Schema => self.kb.schema(),
        };
        Ok(ResourceContents::text(uri, "text/plain", text))
    }
}

/// Build the RAG server over an opened knowledge base
#[inline]
pub async fn build_server(kb: Arc<KnowledgeBase>) -> Result<Arc<McpServer>> {
    let server = McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))?
        .with_instructions("Add, search and question documents in a local knowledge base");

    for tool in RagTool::ALL {
        server
            .register_tool(tool.definition(), RagToolHandler::new(Arc::clone(&kb), tool))
            .await;
    }

    server
        .register_resource(
            Resource::new("rag://stats", "知识库统计", "当前知识库的统计信息", "text/plain"),
            RagResourceHandler {
                kb: Arc::clone(&kb),
                resource: RagResource::Stats,
            },
        )
        .await;
    server
        .register_resource(
            Resource::new("rag://schema", "数据库模式", "向量数据库的结构信息", "text/plain"),
            RagResourceHandler {
                kb: Arc::clone(&kb),
                resource: RagResource::Schema,
            },
        )
        .await;

    Ok(Arc::new(server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::fake::CharBagEmbedder;
    use crate::llm::fake::ScriptedModel;
    use crate::mcp::protocol::JsonRpcMessage;
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn knowledge_base(dir: &TempDir) -> Arc<KnowledgeBase> {
        let model = ScriptedModel::new(Vec::new()).with_fallback("Rust 是一门系统编程语言。");
        Arc::new(
            KnowledgeBase::open(
                dir.path(),
                Arc::new(CharBagEmbedder::new(32)),
                Some(Arc::new(model)),
            )
            .await
            .expect("knowledge base opens"),
        )
    }

    fn params(name: &str, args: Value) -> CallToolParams {
        let arguments: HashMap<String, Value> =
            serde_json::from_value(args).expect("arguments are an object");
        CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        }
    }

    async fn call(kb: &Arc<KnowledgeBase>, tool: RagTool, args: Value) -> CallToolResult {
        RagToolHandler::new(Arc::clone(kb), tool)
            .handle(params(tool.name(), args))
            .await
            .expect("handler never fails")
    }

    #[tokio::test]
    async fn add_then_search_through_tools() {
        let dir = TempDir::new().expect("temp dir");
        let kb = knowledge_base(&dir).await;

        let added = call(
            &kb,
            RagTool::AddDocument,
            json!({"content": "Rust 所有权系统保证内存安全", "metadata": {"source": "rust.md"}}),
        )
        .await;
        assert!(!added.is_error());
        assert!(added.joined_text().contains("✅ 成功添加文档"));

        let found = call(
            &kb,
            RagTool::Search,
            json!({"query": "内存安全", "k": 2, "include_scores": true, "filter": {"source": "rust.md"}}),
        )
        .await;
        assert!(found.joined_text().contains("🔍 找到 1 个相关文档"));
        assert!(found.joined_text().contains("相似度"));
    }

    #[tokio::test]
    async fn missing_required_argument() {
        let dir = TempDir::new().expect("temp dir");
        let kb = knowledge_base(&dir).await;

        let result = call(&kb, RagTool::Search, json!({"k": 3})).await;
        assert!(result.is_error());
        assert_eq!(
            result.joined_text(),
            "错误：执行工具 search 时出错 - 缺少参数 'query'"
        );

        let result = call(&kb, RagTool::DeleteDocuments, json!({"confirm": true})).await;
        assert_eq!(
            result.joined_text(),
            "错误：执行工具 delete_documents 时出错 - 缺少参数 'filter'"
        );
    }

    #[tokio::test]
    async fn bad_filter_and_argument_types() {
        let dir = TempDir::new().expect("temp dir");
        let kb = knowledge_base(&dir).await;

        let result = call(
            &kb,
            RagTool::ListDocuments,
            json!({"filter": {"bad key": "x"}}),
        )
        .await;
        assert!(result.is_error());
        assert!(result.joined_text().contains("invalid filter key 'bad key'"));

        let result = call(&kb, RagTool::Search, json!({"query": "x", "k": -1})).await;
        assert!(result.joined_text().contains("参数 'k' 必须是非负整数"));

        let result = call(
            &kb,
            RagTool::AddFile,
            json!({"file_path": "a.txt", "encoding": "gbk"}),
        )
        .await;
        assert!(result.joined_text().contains("不支持的编码 gbk"));
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let dir = TempDir::new().expect("temp dir");
        let kb = knowledge_base(&dir).await;

        let result = call(
            &kb,
            RagTool::DeleteDocuments,
            json!({"filter": {"source": "x"}, "confirm": false}),
        )
        .await;
        assert_eq!(result.joined_text(), "❌ 删除操作需要确认。请设置 confirm=true");
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn answer_question_and_stats() {
        let dir = TempDir::new().expect("temp dir");
        let kb = knowledge_base(&dir).await;

        call(
            &kb,
            RagTool::AddDocument,
            json!({"content": "Rust 是一门系统编程语言", "metadata": {"filename": "intro.md"}}),
        )
        .await;

        let answer = call(&kb, RagTool::AnswerQuestion, json!({"question": "Rust 是什么"})).await;
        assert!(answer.joined_text().contains("Rust 是一门系统编程语言。"));
        assert!(answer.joined_text().contains("intro.md"));

        let stats = call(&kb, RagTool::GetStats, json!({})).await;
        assert!(stats.joined_text().contains("char-bag"));
    }

    #[tokio::test]
    async fn missing_chat_model_is_reported_as_failure() {
        let dir = TempDir::new().expect("temp dir");
        let kb = Arc::new(
            KnowledgeBase::open(dir.path(), Arc::new(CharBagEmbedder::new(32)), None)
                .await
                .expect("knowledge base opens"),
        );

        let result = call(&kb, RagTool::AnswerQuestion, json!({"question": "任何问题"})).await;
        assert!(result.is_error());
        assert!(result.joined_text().starts_with("回答问题失败："));
    }

    #[tokio::test]
    async fn server_lists_tools_and_reads_resources() {
        let dir = TempDir::new().expect("temp dir");
        let server = build_server(knowledge_base(&dir).await)
            .await
            .expect("server builds");

        assert_eq!(
            server.tool_names().await,
            vec![
                "add_document",
                "add_file",
                "search",
                "answer_question",
                "list_documents",
                "delete_documents",
                "get_stats"
            ]
        );

        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"rag://schema"}}"#)
            .await;
        let Some(JsonRpcMessage::Response(response)) = reply else {
            panic!("expected a response, got {:?}", reply);
        };
        let text = response.result["contents"][0]["text"]
            .as_str()
            .expect("text contents");
        assert!(text.contains("SQLite + LanceDB"));
    }
}
