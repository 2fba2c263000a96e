use anyhow::{Context, Result, anyhow, bail};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::agent::{Agent, ConversationMemory, MemoryKind};
use crate::config::{API_KEY_MARKER, Config, resolve_api_key};
use crate::crew::{Crew, DEFAULT_ARTICLE_TYPE};
use crate::database::Metadata;
use crate::embeddings::{Embedder, OllamaClient};
use crate::llm::{ChatModel, OpenAiClient};
use crate::mcp::{McpClient, McpServer, servers};
use crate::rag::{DEFAULT_ANSWER_TEMPERATURE, DEFAULT_CONTEXT_K, KnowledgeBase};
use crate::scaffold::{self, EnvStatus};
use crate::tools::ToolRegistry;
use crate::workflow::{ArticleType, ArticleWorkflow};

const ARTICLE_PREVIEW_CHARS: usize = 500;

/// Chat client for the configured endpoint; fails with a hint when no `sk-`
/// key is set, which makes the command exit with status 1
#[inline]
pub fn chat_model(config: &Config) -> Result<Arc<dyn ChatModel>> {
    let Some((api_key, source)) = resolve_api_key() else {
        eprintln!("{}", style(EnvStatus::MissingKey.message()).yellow());
        eprintln!("{}", scaffold::ENV_HINT);
        bail!("No API key containing `{}` in OPENAI_API_KEY or OPENAI_KEY", API_KEY_MARKER);
    };
    info!("Using API key from {:?}", source);

    let client = OpenAiClient::new(&config.llm, api_key)?;
    Ok(Arc::new(client))
}

fn optional_chat_model(config: &Config) -> Option<Arc<dyn ChatModel>> {
    let (api_key, _) = resolve_api_key()?;
    match OpenAiClient::new(&config.llm, api_key) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Chat model unavailable: {:#}", e);
            None
        }
    }
}

async fn open_knowledge_base(
    config: &Config,
    model: Option<Arc<dyn ChatModel>>,
) -> Result<KnowledgeBase> {
    let embedder: Arc<dyn Embedder> = Arc::new(
        OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?,
    );
    KnowledgeBase::from_config(config, embedder, model)
        .await
        .context("Failed to open knowledge base")
}

/// Scaffold a project directory and print what changed
#[inline]
pub fn init_project(dir: &Path) -> Result<()> {
    let report = scaffold::scaffold(dir)?;
    println!("{}", report);
    Ok(())
}

/// Print the status of `env_file`; `false` when it is not configured
#[inline]
pub fn check_env(env_file: &Path) -> bool {
    let status = scaffold::check_env(env_file);
    if status.is_configured() {
        println!("{}", style(status.message()).green());
    } else {
        eprintln!("{}", style(status.message()).red());
        eprintln!("{}", scaffold::ENV_HINT);
    }
    status.is_configured()
}

/// Probe the embedding server and the chat endpoint; `false` when either is unusable
#[inline]
pub async fn doctor(config: &Config) -> Result<bool> {
    let ollama = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let embeddings = tokio::task::spawn_blocking(move || ollama.check_model())
        .await
        .context("Ollama probe did not finish")?
        .map(|name| format!("{} 可用", name));
    let embeddings_ok = report_probe("Ollama", embeddings);

    let chat = match resolve_api_key() {
        None => Err(anyhow!("未设置 OPENAI_API_KEY")),
        Some((api_key, _)) => {
            let client = OpenAiClient::new(&config.llm, api_key)?;
            let wanted = config.llm.model.clone();
            tokio::task::spawn_blocking(move || client.health_check())
                .await
                .context("Chat endpoint probe did not finish")?
                .map(|models| {
                    if models.iter().any(|m| m.id == wanted) {
                        format!("{} 可用", wanted)
                    } else {
                        format!("已连接，但未列出 {}（共 {} 个模型）", wanted, models.len())
                    }
                })
        }
    };
    let chat_ok = report_probe("Chat API", chat);

    Ok(embeddings_ok && chat_ok)
}

fn report_probe(name: &str, outcome: Result<String>) -> bool {
    match outcome {
        Ok(detail) => {
            println!("{} {}: {}", style("✅").green(), name, detail);
            true
        }
        Err(e) => {
            println!("{} {}: {:#}", style("❌").red(), name, e);
            false
        }
    }
}

/// One-shot tool-calling agent over the mock tools
#[inline]
pub fn run_agent(config: &Config, query: &str) -> Result<()> {
    let model = chat_model(config)?;
    let mut agent = Agent::new(model, ToolRegistry::with_default_tools())
        .with_max_iterations(config.llm.max_iterations)
        .with_temperature(config.llm.temperature);

    let outcome = agent.run(query)?;
    for step in &outcome.steps {
        println!(
            "{} {}({}) → {}",
            style("🔧").dim(),
            style(&step.tool).cyan(),
            step.input,
            step.output
        );
    }
    println!("{}", outcome.answer);
    Ok(())
}

/// Interactive chat with conversation memory
#[inline]
pub fn run_chat(config: &Config, memory: Option<MemoryKind>) -> Result<()> {
    let model = chat_model(config)?;
    let kind = memory.unwrap_or(config.memory.kind);
    let memory =
        ConversationMemory::from_kind(kind, config.memory.window_size, Some(Arc::clone(&model)))?;
    let mut agent = Agent::new(model, ToolRegistry::with_default_tools())
        .with_max_iterations(config.llm.max_iterations)
        .with_temperature(config.llm.temperature)
        .with_memory(memory);

    println!(
        "{}",
        style(format!("💬 对话模式（记忆类型: {}）", kind)).bold().cyan()
    );
    println!("输入 /info 查看记忆，/clear 清空记忆，/quit 退出");

    loop {
        let line: String = Input::new()
            .with_prompt("你")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/info" => {
                if let Some(memory) = agent.memory() {
                    println!("{}", memory.info());
                }
            }
            "/clear" => {
                if let Some(memory) = agent.memory_mut() {
                    memory.clear();
                }
                println!("🧹 记忆已清空");
            }
            query => match agent.run(query) {
                Ok(outcome) => println!("{} {}", style("AI:").green().bold(), outcome.answer),
                Err(e) => {
                    error!("Chat turn failed: {}", e);
                    eprintln!("{} {}", style("错误:").red(), e);
                }
            },
        }
    }

    Ok(())
}

async fn serve(server: Arc<McpServer>) -> Result<()> {
    info!(
        "Serving MCP tools on stdio: {}",
        server.tool_names().await.join(", ")
    );

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            result.context("MCP server stopped with an error")?;
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down");
        }
    }

    Ok(())
}

#[inline]
pub async fn serve_math() -> Result<()> {
    serve(servers::math::build_server().await?).await
}

#[inline]
pub async fn serve_files(root: &Path) -> Result<()> {
    serve(servers::files::build_server(root).await?).await
}

#[inline]
pub async fn serve_rag(config: &Config) -> Result<()> {
    let model = optional_chat_model(config);
    if model.is_none() {
        warn!("No API key configured; answer_question will report an error");
    }
    let kb = Arc::new(open_knowledge_base(config, model).await?);
    serve(servers::rag::build_server(kb).await?).await
}

/// Add files to the knowledge base with a progress bar
#[inline]
pub async fn ingest(config: &Config, files: &[PathBuf]) -> Result<()> {
    let probe = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let served = tokio::task::spawn_blocking(move || probe.check_model())
        .await
        .context("Model check did not finish")??;
    info!("Embedding with {}", served);

    let kb = open_knowledge_base(config, None).await?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut reports = Vec::with_capacity(files.len());
    for file in files {
        progress.set_message(file.display().to_string());
        let report = kb
            .add_file(file, Metadata::new())
            .await
            .with_context(|| format!("Failed to ingest {}", file.display()))?;
        reports.push(report);
        progress.inc(1);
    }
    progress.finish_with_message("完成");

    for report in reports {
        println!("{}\n", report);
    }
    Ok(())
}

#[inline]
pub async fn search(config: &Config, query: &str, k: usize) -> Result<()> {
    let kb = open_knowledge_base(config, None).await?;
    println!("{}", kb.search(query, k, None, true).await?);
    Ok(())
}

#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let model = chat_model(config)?;
    let kb = open_knowledge_base(config, Some(model)).await?;
    let answer = kb
        .answer_question(question, DEFAULT_CONTEXT_K, true, DEFAULT_ANSWER_TEMPERATURE)
        .await?;
    println!("{}", answer);
    Ok(())
}

#[inline]
pub async fn stats(config: &Config) -> Result<()> {
    let kb = open_knowledge_base(config, None).await?;
    println!("{}", kb.stats().await?);
    Ok(())
}

#[inline]
pub fn run_workflow(
    config: &Config,
    topic: &str,
    article_type: ArticleType,
    audience: &str,
) -> Result<()> {
    let model = chat_model(config)?;
    println!(
        "{}",
        style(format!("📝 开始撰写{}：{}", article_type, topic))
            .bold()
            .cyan()
    );

    let state = ArticleWorkflow::new(model).write_article(topic, article_type, audience)?;
    println!("{}", state.report(ARTICLE_PREVIEW_CHARS));
    Ok(())
}

#[inline]
pub fn run_crew(config: &Config, topic: &str, article_type: Option<&str>) -> Result<()> {
    let model = chat_model(config)?;
    let (crew, tasks) =
        Crew::research_writing(model, topic, article_type.unwrap_or(DEFAULT_ARTICLE_TYPE));

    println!("{}", crew.agent_info());
    println!("{}", style(format!("🚀 团队开始工作：{}", topic)).bold().cyan());

    let output = crew.kickoff(&tasks)?;
    println!("{}", output.report());
    Ok(())
}

/// Spawn `command`, list its tools, and call `tool` when given
#[inline]
pub async fn mcp_call(tool: Option<&str>, args: Option<&str>, command: &[String]) -> Result<()> {
    let Some((program, program_args)) = command.split_first() else {
        bail!("Missing server command after --");
    };

    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
        None => Value::Object(serde_json::Map::new()),
    };
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let mut client = McpClient::spawn(program, program_args)?;
    let init = client.initialize().await?;
    println!(
        "🔗 已连接 {} {}",
        init.server_info.name, init.server_info.version
    );

    let tools = client.list_tools().await?;
    println!("🛠️ 可用工具：");
    for t in &tools {
        println!(
            "  - {}: {}",
            t.name,
            t.description.as_deref().unwrap_or_default()
        );
    }

    if let Some(name) = tool {
        let result = client.call_tool(name, arguments).await?;
        let text = result.joined_text();
        if result.is_error() {
            eprintln!("{} {}", style("❌").red(), text);
        } else {
            println!("✅ {}", text);
        }
    }

    client.shutdown().await?;
    Ok(())
}
