// Configuration management: TOML settings, `.env` secrets, interactive setup

pub mod env;
pub mod interactive;
pub mod settings;

pub use env::{API_KEY_MARKER, ApiKeySource, load_dotenv, resolve_api_key};
pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, LlmConfig, MemoryConfig, OllamaConfig, check};
