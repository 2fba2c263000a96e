use agent_lab::Result;
use agent_lab::agent::MemoryKind;
use agent_lab::commands::{
    ask, check_env, doctor, init_project, ingest, mcp_call, run_agent, run_chat, run_crew, run_workflow,
    search, serve_files, serve_math, serve_rag, stats,
};
use agent_lab::config::{Config, load_dotenv, run_interactive_config, show_config};
use agent_lab::rag::DEFAULT_SEARCH_K;
use agent_lab::workflow::ArticleType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-lab")]
#[command(about = "Hands-on lab for tool-calling agents, RAG knowledge bases and MCP servers")]
#[command(version)]
struct Cli {
    /// Data and configuration directory (defaults to $AGENT_LAB_HOME or ~/.agent-lab)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the chat model, Ollama and memory settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the project layout and template files
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Check that the env file holds an API key
    CheckEnv {
        #[arg(long, default_value = ".env")]
        file: PathBuf,
    },
    /// Check that Ollama and the chat endpoint are reachable
    Doctor,
    /// Answer one query with the tool-calling agent
    Agent { query: String },
    /// Interactive chat with conversation memory
    Chat {
        #[arg(long, value_enum)]
        memory: Option<MemoryKind>,
    },
    /// Start an MCP server on stdio
    Serve {
        #[command(subcommand)]
        server: ServeTarget,
    },
    /// Add files to the knowledge base
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the knowledge base
    Search {
        query: String,
        #[arg(short, default_value_t = DEFAULT_SEARCH_K)]
        k: usize,
    },
    /// Answer a question from the knowledge base
    Ask { question: String },
    /// Show knowledge base statistics
    Stats,
    /// Write an article with the review-and-revise workflow
    Workflow {
        topic: String,
        #[arg(long = "type", value_enum, default_value_t = ArticleType::Blog)]
        article_type: ArticleType,
        #[arg(long, default_value = "general")]
        audience: String,
    },
    /// Research and write with a crew of role agents
    Crew {
        topic: String,
        /// Kind of article the writer produces
        #[arg(long = "type")]
        article_type: Option<String>,
    },
    /// Connect to an MCP server command and call one of its tools
    McpCall {
        /// Tool to call; only lists tools when omitted
        tool: Option<String>,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// Server command line
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ServeTarget {
    /// Arithmetic tools
    Math,
    /// Sandboxed file browsing tools
    Files {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Knowledge base tools
    Rag,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    load_dotenv(None);

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => Config::default_base_dir().map_err(|e| agent_lab::LabError::Config(e.to_string()))?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Init { dir } => init_project(&dir)?,
        Commands::CheckEnv { file } => {
            if !check_env(&file) {
                std::process::exit(1);
            }
        }
        command => {
            let config = Config::load(&base_dir)?;
            match command {
                Commands::Doctor => {
                    if !doctor(&config).await? {
                        std::process::exit(1);
                    }
                }
                Commands::Agent { query } => run_agent(&config, &query)?,
                Commands::Chat { memory } => run_chat(&config, memory)?,
                Commands::Serve { server } => match server {
                    ServeTarget::Math => serve_math().await?,
                    ServeTarget::Files { root } => serve_files(&root).await?,
                    ServeTarget::Rag => serve_rag(&config).await?,
                },
                Commands::Ingest { files } => ingest(&config, &files).await?,
                Commands::Search { query, k } => search(&config, &query, k).await?,
                Commands::Ask { question } => ask(&config, &question).await?,
                Commands::Stats => stats(&config).await?,
                Commands::Workflow {
                    topic,
                    article_type,
                    audience,
                } => run_workflow(&config, &topic, article_type, &audience)?,
                Commands::Crew {
                    topic,
                    article_type,
                } => run_crew(&config, &topic, article_type.as_deref())?,
                Commands::McpCall {
                    tool,
                    args,
                    command,
                } => mcp_call(tool.as_deref(), args.as_deref(), &command).await?,
                Commands::Config { .. } | Commands::Init { .. } | Commands::CheckEnv { .. } => {}
            }
        }
    }

    Ok(())
}
