// Knowledge base: split, embed and store documents, then retrieve and answer

#[cfg(test)]
mod tests;

use anyhow::Context;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{
    Chunk, ChunkRecord, Database, Metadata, MetadataFilter, NewChunk, NewDocument, VectorStore,
};
use crate::embeddings::chunking::{char_len, preview};
use crate::embeddings::{Embedder, RecursiveSplitter};
use crate::llm::ChatModel;
use crate::{LabError, Result};

pub const DEFAULT_SEARCH_K: usize = 5;
pub const DEFAULT_CONTEXT_K: usize = 3;
pub const DEFAULT_LIST_LIMIT: i64 = 10;
pub const DEFAULT_ANSWER_TEMPERATURE: f32 = 0.1;

const SEARCH_PREVIEW_CHARS: usize = 200;
const LIST_PREVIEW_CHARS: usize = 100;
const PREVIEWS_PER_SOURCE: usize = 3;
const TOP_SOURCES: usize = 10;
const RULE_WIDTH: usize = 60;

const ANSWER_SYSTEM_PROMPT: &str = "你是一个基于知识库回答问题的助手。";

/// A stored chunk with its similarity to the query
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub metadata: Metadata,
    pub similarity: f32,
}

impl RetrievedChunk {
    /// Filename if known, otherwise the source
    fn label(&self) -> Option<String> {
        self.metadata
            .get("filename")
            .or_else(|| self.metadata.get("source"))
            .map(display_value)
    }
}

pub struct KnowledgeBase {
    sqlite: Database,
    vectors: VectorStore,
    embedder: Arc<dyn Embedder>,
    model: Option<Arc<dyn ChatModel>>,
    splitter: RecursiveSplitter,
    base_dir: PathBuf,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("base_dir", &self.base_dir)
            .field("embedding_model", &self.embedder.model_name())
            .field("has_model", &self.model.is_some())
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Open the stores under `base_dir` (`knowledge.db` and `vectors/`)
    #[inline]
    pub async fn open(
        base_dir: &Path,
        embedder: Arc<dyn Embedder>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        let sqlite = Database::initialize_in(base_dir).await?;
        let vectors = VectorStore::new(&base_dir.join("vectors"), embedder.dimension()).await?;

        info!(
            "Knowledge base opened at {} with embedding model {}",
            base_dir.display(),
            embedder.model_name()
        );

        Ok(Self {
            sqlite,
            vectors,
            embedder,
            model,
            splitter: RecursiveSplitter::default(),
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Open using the paths and chunking settings of `config`
    #[inline]
    pub async fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Result<Self> {
        let splitter = RecursiveSplitter::from_config(&config.chunking)?;
        let sqlite = Database::initialize_in(&config.base_dir).await?;
        let vectors =
            VectorStore::new(&config.vector_database_path(), embedder.dimension()).await?;

        Ok(Self {
            sqlite,
            vectors,
            embedder,
            model,
            splitter,
            base_dir: config.base_dir.clone(),
        })
    }

    #[inline]
    pub fn with_splitter(mut self, splitter: RecursiveSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.sqlite
    }

    #[inline]
    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .context("Embedding task panicked")?
            .map_err(|e| LabError::Embedding(format!("{:#}", e)))?;
        Ok(vectors)
    }

    /// Split `content`, embed every chunk and store it in both stores
    #[inline]
    pub async fn add_document(
        &self,
        content: &str,
        metadata: Metadata,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<String> {
        if content.trim().is_empty() {
            return Ok("错误：文档内容不能为空".to_string());
        }

        let splitter = RecursiveSplitter::new(chunk_size, chunk_overlap)?;
        self.store_document(content, metadata, &splitter).await
    }

    async fn store_document(
        &self,
        content: &str,
        metadata: Metadata,
        splitter: &RecursiveSplitter,
    ) -> Result<String> {
        let chunks = splitter.split_text(content);
        if chunks.is_empty() {
            return Ok("错误：无法分割文档内容".to_string());
        }

        let vectors = self.embed_texts(chunks.clone()).await?;
        if vectors.len() != chunks.len() {
            return Err(LabError::Embedding(format!(
                "Expected {} embeddings, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let document_id = Uuid::new_v4().to_string();
        let total = chunks.len() as i64;
        let source = metadata
            .get("source")
            .map(display_value)
            .unwrap_or_else(|| "inline".to_string());

        let new_chunks: Vec<NewChunk> = chunks
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let mut chunk_metadata = metadata.clone();
                chunk_metadata.insert("chunk_index".to_string(), Value::from(index));
                chunk_metadata.insert("total_chunks".to_string(), Value::from(total));
                chunk_metadata.insert("chunk_size".to_string(), Value::from(char_len(text)));
                NewChunk {
                    id: Uuid::new_v4().to_string(),
                    document_id: document_id.clone(),
                    chunk_index: index as i64,
                    total_chunks: total,
                    content: text.clone(),
                    metadata: chunk_metadata,
                }
            })
            .collect();

        let records: Vec<ChunkRecord> = new_chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| ChunkRecord {
                id: chunk.id.clone(),
                vector,
                document_id: document_id.clone(),
                content: chunk.content.clone(),
            })
            .collect();

        self.sqlite
            .insert_document(
                NewDocument {
                    id: document_id.clone(),
                    source,
                    metadata: metadata.clone(),
                    chunk_count: total,
                },
                &new_chunks,
            )
            .await?;

        if let Err(e) = self.vectors.store_batch(&records).await {
            warn!("Vector write failed, rolling back document {}", document_id);
            let ids: Vec<String> = new_chunks.iter().map(|c| c.id.clone()).collect();
            self.sqlite.remove_chunks(&ids).await?;
            return Err(e);
        }

        let total_chars: usize = chunks.iter().map(|c| char_len(c)).sum();
        info!("Added document {} with {} chunks", document_id, chunks.len());

        Ok(format!(
            "✅ 成功添加文档，共生成 {} 个文本块\n📊 平均块大小: {} 字符\n📝 元数据: {}",
            chunks.len(),
            total_chars / chunks.len(),
            Value::Object(metadata)
        ))
    }

    /// Read a UTF-8 text file and add it with file metadata
    #[inline]
    pub async fn add_file(&self, path: &Path, metadata: Metadata) -> Result<String> {
        if !path.exists() {
            return Ok(format!("错误：文件不存在 - {}", path.display()));
        }
        if !path.is_file() {
            return Ok(format!("错误：{} 不是文件", path.display()));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_size = bytes.len();
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                return Ok(format!(
                    "文件编码错误：{}\n提示：尝试使用不同的编码（如 gbk, latin1）",
                    e
                ));
            }
        };

        if content.trim().is_empty() {
            return Ok("错误：文档内容不能为空".to_string());
        }

        let mut file_metadata = Metadata::new();
        file_metadata.insert("source".to_string(), Value::from(path.display().to_string()));
        file_metadata.insert(
            "filename".to_string(),
            Value::from(
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            ),
        );
        file_metadata.insert(
            "file_extension".to_string(),
            Value::from(
                path.extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default(),
            ),
        );
        file_metadata.insert("file_size".to_string(), Value::from(file_size));
        file_metadata.extend(metadata);

        debug!("Adding file {}", path.display());
        self.store_document(&content, file_metadata, &self.splitter)
            .await
    }

    /// Nearest chunks to `query`, restricted to `filter` matches when given
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let only_ids = match filter.filter(|f| !f.is_empty()) {
            Some(filter) => Some(self.sqlite.find_chunk_ids(filter).await?),
            None => None,
        };

        let mut query_vector = self.embed_texts(vec![query.to_string()]).await?;
        let query_vector = query_vector
            .pop()
            .ok_or_else(|| LabError::Embedding("No embedding returned for query".to_string()))?;

        let hits = self
            .vectors
            .search(&query_vector, k, only_ids.as_deref())
            .await?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|h| h.chunk_id.clone()).collect();
        let mut rows: HashMap<String, Chunk> = self
            .sqlite
            .get_chunks(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut retrieved = Vec::with_capacity(hits.len());
        for hit in hits {
            match rows.remove(&hit.chunk_id) {
                Some(chunk) => retrieved.push(RetrievedChunk {
                    metadata: chunk.metadata_map(),
                    chunk,
                    similarity: hit.similarity,
                }),
                None => warn!("Vector {} has no matching chunk row", hit.chunk_id),
            }
        }

        Ok(retrieved)
    }

    #[inline]
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        include_scores: bool,
    ) -> Result<String> {
        if query.trim().is_empty() {
            return Ok("错误：搜索查询不能为空".to_string());
        }

        let results = self.retrieve(query, k, filter).await?;
        if results.is_empty() {
            return Ok("没有找到相关文档".to_string());
        }

        let mut output = format!("🔍 找到 {} 个相关文档 (查询: '{}'):\n\n", results.len(), query);
        for (i, result) in results.iter().enumerate() {
            if include_scores {
                let _ = writeln!(output, "[文档 {}] (相似度: {:.4})", i + 1, result.similarity);
            } else {
                let _ = writeln!(output, "[文档 {}]", i + 1);
            }
            let _ = writeln!(
                output,
                "内容: {}",
                preview(&result.chunk.content, SEARCH_PREVIEW_CHARS)
            );
            let _ = writeln!(output, "元数据: {}", Value::Object(result.metadata.clone()));
            let _ = writeln!(output, "{}", "-".repeat(RULE_WIDTH));
        }

        Ok(output)
    }

    /// Retrieve context for `question` and ask the chat model
    #[inline]
    pub async fn answer_question(
        &self,
        question: &str,
        context_k: usize,
        include_sources: bool,
        temperature: f32,
    ) -> Result<String> {
        if question.trim().is_empty() {
            return Ok("错误：问题不能为空".to_string());
        }

        let model = self
            .model
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| LabError::Llm("No chat model configured".to_string()))?;

        let docs = self.retrieve(question, context_k, None).await?;
        let Some(top) = docs.first() else {
            return Ok("❌ 知识库中没有找到相关信息来回答这个问题".to_string());
        };
        let top_similarity = top.similarity;

        let context = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("[上下文 {}]: {}", i + 1, doc.chunk.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "基于以下上下文信息回答问题。请给出准确、有用的回答。如果上下文中没有足够的信息来完整回答问题，请明确说明。\n\n上下文信息：\n{}\n\n问题：{}\n\n请基于上下文信息提供详细的回答：",
            context, question
        );

        let reply = tokio::task::spawn_blocking(move || {
            model.complete(ANSWER_SYSTEM_PROMPT, &prompt, temperature)
        })
        .await
        .context("Chat task panicked")?
        .map_err(|e| LabError::Llm(format!("{:#}", e)))?;

        let mut answer = format!("🤖 **回答**\n\n{}\n\n", reply);

        if include_sources {
            let _ = writeln!(answer, "📚 **信息来源** (基于 {} 个相关文档):", docs.len());
            for (i, doc) in docs.iter().enumerate() {
                let label = doc
                    .label()
                    .unwrap_or_else(|| format!("文档块 {}", i + 1));
                let _ = writeln!(answer, "  {}. {} (相似度: {:.3})", i + 1, label, doc.similarity);
            }
        }

        answer.push_str("\n🔍 **检索统计**\n");
        let _ = writeln!(answer, "  - 查询问题: {}", question);
        let _ = writeln!(answer, "  - 检索到的文档数量: {}", docs.len());
        let _ = writeln!(answer, "  - 最高相似度: {:.3}", top_similarity);
        let _ = writeln!(answer, "  - 回答温度: {}", temperature);

        Ok(answer)
    }

    #[inline]
    pub async fn list_documents(
        &self,
        limit: i64,
        filter: Option<&MetadataFilter>,
    ) -> Result<String> {
        let chunks = self
            .sqlite
            .list_chunks(Some(limit), filter.filter(|f| !f.is_empty()))
            .await?;
        if chunks.is_empty() {
            return Ok("知识库为空".to_string());
        }

        let mut output = format!("📚 知识库文档列表 (显示前 {} 个):\n\n", chunks.len());

        let mut groups: Vec<(String, Vec<(usize, &Chunk)>)> = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            let source = source_of(&chunk.metadata_map(), "未知来源");
            match groups.iter_mut().find(|(s, _)| *s == source) {
                Some((_, items)) => items.push((index, chunk)),
                None => groups.push((source, vec![(index, chunk)])),
            }
        }

        for (source, items) in &groups {
            let _ = writeln!(output, "📄 **{}** ({} 个文档块)", source, items.len());
            for (index, chunk) in items.iter().take(PREVIEWS_PER_SOURCE) {
                let _ = writeln!(
                    output,
                    "  {}. [块 {}/{}] {}",
                    index + 1,
                    chunk.chunk_index + 1,
                    chunk.total_chunks,
                    preview(&chunk.content, LIST_PREVIEW_CHARS)
                );
            }
            if items.len() > PREVIEWS_PER_SOURCE {
                let _ = writeln!(output, "  ... 还有 {} 个块", items.len() - PREVIEWS_PER_SOURCE);
            }
            output.push('\n');
        }

        let total_chars: usize = chunks.iter().map(|c| char_len(&c.content)).sum();
        output.push_str("📊 **统计信息**\n");
        let _ = writeln!(output, "  - 总文档块数: {}", chunks.len());
        let _ = writeln!(output, "  - 不同来源数: {}", groups.len());
        let _ = writeln!(output, "  - 总字符数: {}", thousands(total_chars));
        let _ = writeln!(output, "  - 平均块大小: {} 字符", total_chars / chunks.len());

        Ok(output)
    }

    /// Delete every chunk matching `filter` from both stores. Metadata goes
    /// first: a vector left behind by a failed second step is never returned,
    /// since retrieval drops hits without a chunk row.
    #[inline]
    pub async fn delete_documents(
        &self,
        filter: Option<&MetadataFilter>,
        confirm: bool,
    ) -> Result<String> {
        if !confirm {
            return Ok("❌ 删除操作需要确认。请设置 confirm=true".to_string());
        }
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok("❌ 删除操作需要提供过滤条件以确保安全".to_string());
        };

        let ids = self.sqlite.find_chunk_ids(filter).await?;
        if ids.is_empty() {
            return Ok(format!("没有找到匹配条件的文档: {}", filter));
        }

        let (deleted, pruned) = self.sqlite.remove_chunks(&ids).await?;
        if let Err(e) = self.vectors.delete_ids(&ids).await {
            warn!("Chunk rows deleted but vectors remain: {:#}", e);
            return Err(e);
        }
        info!("Deleted {} chunks, pruned {} documents", deleted, pruned);

        Ok(format!("✅ 成功删除 {} 个文档\n删除条件: {}", ids.len(), filter))
    }

    #[inline]
    pub async fn stats(&self) -> Result<String> {
        let chunks = self.sqlite.all_chunks().await?;
        if chunks.is_empty() {
            return Ok("📊 知识库统计信息\n\n❌ 知识库为空".to_string());
        }

        let total = chunks.len();
        let sizes: Vec<usize> = chunks.iter().map(|c| char_len(&c.content)).collect();
        let total_chars: usize = sizes.iter().sum();

        let mut sources: Vec<(String, usize)> = Vec::new();
        let mut extensions: Vec<(String, usize)> = Vec::new();
        for chunk in &chunks {
            let metadata = chunk.metadata_map();
            bump(&mut sources, source_of(&metadata, "未知"));
            if let Some(ext) = metadata.get("file_extension") {
                bump(&mut extensions, display_value(ext));
            }
        }
        sources.sort_by(|a, b| b.1.cmp(&a.1));
        extensions.sort_by(|a, b| b.1.cmp(&a.1));

        let percent = |count: usize| count as f64 / total as f64 * 100.0;

        let mut stats = "📊 **知识库详细统计信息**\n\n🔢 **基础统计**\n".to_string();
        let _ = writeln!(stats, "  - 总文档块数: {}", thousands(total));
        let _ = writeln!(stats, "  - 总字符数: {}", thousands(total_chars));
        let _ = writeln!(stats, "  - 平均块大小: {} 字符", total_chars / total);
        let _ = writeln!(stats, "  - 最大块大小: {} 字符", sizes.iter().max().unwrap_or(&0));
        let _ = writeln!(stats, "  - 最小块大小: {} 字符", sizes.iter().min().unwrap_or(&0));
        let _ = writeln!(stats, "  - 数据库路径: {}\n", self.base_dir.display());

        stats.push_str("📁 **来源分布** (Top 10)\n");
        for (source, count) in sources.iter().take(TOP_SOURCES) {
            let _ = writeln!(stats, "  - {}: {} 块 ({:.1}%)", source, count, percent(*count));
        }
        if sources.len() > TOP_SOURCES {
            let _ = writeln!(stats, "  ... 还有 {} 个来源", sources.len() - TOP_SOURCES);
        }
        stats.push('\n');

        if !extensions.is_empty() {
            stats.push_str("📄 **文件类型分布**\n");
            for (ext, count) in &extensions {
                let label = if ext.is_empty() { "无扩展名" } else { ext.as_str() };
                let _ = writeln!(stats, "  - {}: {} 块 ({:.1}%)", label, count, percent(*count));
            }
            stats.push('\n');
        }

        stats.push_str("⚙️ **系统信息**\n");
        let _ = writeln!(stats, "  - 嵌入模型: {}", self.embedder.model_name());
        let _ = writeln!(stats, "  - 向量维度: {}", self.vectors.dimension());
        stats.push_str("  - 数据库类型: SQLite + LanceDB\n");

        Ok(stats)
    }

    /// Static description of what the store holds and supports
    #[inline]
    pub fn schema(&self) -> String {
        let dimension = self.vectors.dimension();
        let mut schema = "🗄️ **向量数据库模式信息**\n\n**基础配置**\n".to_string();
        schema.push_str("  - 数据库类型: SQLite + LanceDB\n");
        let _ = writeln!(schema, "  - 持久化目录: {}", self.base_dir.display());
        let _ = writeln!(schema, "  - 模型名称: {}", self.embedder.model_name());
        let _ = writeln!(schema, "  - 向量维度: {}\n", dimension);

        schema.push_str("**数据结构**\n");
        schema.push_str("  - 文档内容: chunks.content (text)\n");
        let _ = writeln!(schema, "  - 向量嵌入: vector (float[{}])", dimension);
        schema.push_str(concat!(
            "  - 元数据字段:\n",
            "    • source: 文档来源\n",
            "    • filename: 文件名\n",
            "    • file_extension: 文件扩展名\n",
            "    • file_size: 文件大小\n",
            "    • chunk_index: 块索引\n",
            "    • total_chunks: 总块数\n",
            "    • chunk_size: 块大小\n",
            "    • 自定义元数据...\n\n",
            "**支持的操作**\n",
            "  - search: 向量相似度搜索\n",
            "  - search (include_scores): 带分数的搜索\n",
            "  - add_document / add_file: 添加文档\n",
            "  - delete_documents: 按元数据删除文档\n",
            "  - list_documents: 获取文档\n",
            "  - answer_question: 基于检索的问答\n",
        ));
        schema
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn source_of(metadata: &Metadata, fallback: &str) -> String {
    metadata
        .get("source")
        .or_else(|| metadata.get("filename"))
        .map(display_value)
        .unwrap_or_else(|| fallback.to_string())
}

fn bump(counts: &mut Vec<(String, usize)>, key: String) {
    match counts.iter_mut().find(|(k, _)| *k == key) {
        Some((_, count)) => *count += 1,
        None => counts.push((key, 1)),
    }
}

/// `1234567` → `1,234,567`
#[inline]
pub fn thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
