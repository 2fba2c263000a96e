
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::settings::check;
use super::{Config, LlmConfig, OllamaConfig};
use crate::agent::memory::MemoryKind;
use crate::config::env::resolve_api_key;
use crate::embeddings::OllamaClient;
use crate::http::RetryPolicy;

const PROTOCOLS: [&str; 2] = ["http", "https"];

/// Walk through every setting, probe Ollama, then offer to save
#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Agent Lab 配置向导").bold().cyan());

    let mut config = starting_point(base_dir);

    section("Chat Model", "Any OpenAI-compatible chat-completions endpoint works.");
    prompt_llm(&mut config.llm)?;

    section("Ollama Embeddings", "Embeddings are generated by a local Ollama server.");
    prompt_ollama(&mut config.ollama)?;

    section("Conversation Memory", "Used by `agent-lab chat` unless --memory is given.");
    prompt_memory(&mut config)?;

    eprintln!();
    match probe_ollama(&config.ollama) {
        Ok(served) => eprintln!("{}", style(format!("✓ Ollama serves {}", served)).green()),
        Err(e) => {
            eprintln!("{}", style(format!("⚠ {:#}", e)).yellow());
            eprintln!("You can still save; start Ollama before running `ingest`.");
        }
    }
    if resolve_api_key().is_none() {
        eprintln!(
            "{}",
            style("⚠ OPENAI_API_KEY is not set. Add it to your .env file.").yellow()
        );
    }

    eprintln!();
    let save = Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?;
    if save {
        config.save().context("Failed to save configuration")?;
        eprintln!(
            "{} {}",
            style("✓ Saved to").green(),
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

/// Print the effective settings to stderr
#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let row = |label: &str, value: String| eprintln!("  {}: {}", label, style(value).cyan());

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());

    eprintln!("\n{}", style("Chat Model:").bold().yellow());
    row("API Base", config.llm.api_base.clone());
    row("Model", config.llm.model.clone());
    row("Temperature", config.llm.temperature.to_string());
    row("Max Iterations", config.llm.max_iterations.to_string());
    row("Timeout", format!("{}s", config.llm.timeout_secs));
    match resolve_api_key() {
        Some((_, source)) => eprintln!("  API Key: {} ({:?})", style("set").green(), source),
        None => eprintln!("  API Key: {}", style("missing").red()),
    }

    eprintln!("\n{}", style("Ollama:").bold().yellow());
    match config.ollama.base_url() {
        Ok(url) => row("URL", url.to_string()),
        Err(e) => eprintln!("  URL: {} ({})", style("invalid").red(), e),
    }
    row("Model", config.ollama.model.clone());
    row("Batch Size", config.ollama.batch_size.to_string());
    row("Dimension", config.ollama.embedding_dimension.to_string());

    eprintln!("\n{}", style("Knowledge Base:").bold().yellow());
    row(
        "Chunking",
        format!(
            "{} chars, {} overlap",
            config.chunking.chunk_size, config.chunking.chunk_overlap
        ),
    );
    row("Memory", format!("{} (window {})", config.memory.kind, config.memory.window_size));
    row("Data", config.base_dir.display().to_string());

    eprintln!(
        "\nConfig file: {}",
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

fn section(title: &str, hint: &str) {
    eprintln!();
    eprintln!("{}", style(title).bold().yellow());
    eprintln!("{}", style(hint).dim());
}

/// The saved settings when they load cleanly, otherwise the defaults
fn starting_point(base_dir: &Path) -> Config {
    Config::load(base_dir).map_or_else(
        |e| {
            eprintln!(
                "{}",
                style(format!("Starting from defaults ({:#})", e)).yellow()
            );
            Config {
                base_dir: base_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn prompt_llm(llm: &mut LlmConfig) -> Result<()> {
    llm.api_base = Input::new()
        .with_prompt("API base URL")
        .default(llm.api_base.clone())
        .validate_with(|input: &String| check::http_url(input).map(drop))
        .interact_text()?;

    llm.model = Input::new()
        .with_prompt("Chat model")
        .default(llm.model.clone())
        .validate_with(|input: &String| check::model(input))
        .interact_text()?;

    llm.temperature = Input::new()
        .with_prompt("Temperature")
        .default(llm.temperature)
        .validate_with(|input: &f32| check::temperature(*input))
        .interact_text()?;

    llm.max_iterations = Input::new()
        .with_prompt("Max agent iterations")
        .default(llm.max_iterations)
        .validate_with(|input: &u32| check::max_iterations(*input))
        .interact_text()?;

    Ok(())
}

fn prompt_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let current = PROTOCOLS
        .iter()
        .position(|p| *p == ollama.protocol)
        .unwrap_or(0);
    let picked = Select::new()
        .with_prompt("Protocol")
        .default(current)
        .items(&PROTOCOLS)
        .interact()?;
    ollama.protocol = PROTOCOLS[picked].to_string();

    let protocol = ollama.protocol.clone();
    ollama.host = Input::new()
        .with_prompt("Host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| {
            check::http_url(&format!("{}://{}", protocol, input)).map(drop)
        })
        .interact_text()?;

    ollama.port = Input::new()
        .with_prompt("Port")
        .default(ollama.port)
        .validate_with(|input: &u16| check::port(*input))
        .interact_text()?;

    ollama.model = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| check::model(input))
        .interact_text()?;

    ollama.batch_size = Input::new()
        .with_prompt("Texts per embedding request")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| check::batch_size(*input))
        .interact_text()?;

    ollama.embedding_dimension = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| check::embedding_dimension(*input))
        .interact_text()?;

    Ok(())
}

fn prompt_memory(config: &mut Config) -> Result<()> {
    let kinds = [MemoryKind::Buffer, MemoryKind::Window, MemoryKind::Summary];
    let current = kinds
        .iter()
        .position(|k| *k == config.memory.kind)
        .unwrap_or(0);
    let picked = Select::new()
        .with_prompt("Memory kind")
        .default(current)
        .items(&kinds)
        .interact()?;
    config.memory.kind = kinds[picked];

    if config.memory.kind == MemoryKind::Window {
        config.memory.window_size = Input::new()
            .with_prompt("Exchanges to keep")
            .default(config.memory.window_size)
            .validate_with(|input: &usize| check::window_size(*input))
            .interact_text()?;
    }

    Ok(())
}

/// One attempt against `/api/tags`; the wizard should not stall on retries
fn probe_ollama(ollama: &OllamaConfig) -> Result<String> {
    OllamaClient::new(ollama)?
        .with_retry(RetryPolicy::new(1))
        .check_model()
}
