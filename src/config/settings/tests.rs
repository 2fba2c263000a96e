use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.llm.model, "gpt-3.5-turbo");
    assert_eq!(config.llm.max_iterations, 5);
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.chunk_overlap, 50);
    assert_eq!(config.memory.kind, MemoryKind::Buffer);
    assert_eq!(config.memory.window_size, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.api_base = "not a url".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.temperature = 3.5;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(..))
    ));

    let mut invalid_config = config;
    invalid_config.memory.window_size = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OutOfRange {
            field: "window_size",
            ..
        })
    ));
}

#[test]
fn ollama_base_url() {
    let url = OllamaConfig::default()
        .base_url()
        .expect("default address parses");
    assert_eq!(url.as_str(), "http://localhost:11434/");

    let remote = OllamaConfig {
        protocol: "https".to_string(),
        host: "gpu-box.lan".to_string(),
        port: 443,
        ..OllamaConfig::default()
    };
    assert_eq!(remote.base_url().expect("parses").host_str(), Some("gpu-box.lan"));

    let proxied = OllamaConfig {
        path: "/ollama/".to_string(),
        ..OllamaConfig::default()
    };
    assert_eq!(
        proxied.base_url().expect("parses").as_str(),
        "http://localhost:11434/ollama/"
    );
}

#[test]
fn toml_round_trip_keeps_sections() {
    let mut config = Config::default();
    config.memory.kind = MemoryKind::Window;
    config.llm.model = "qwen2.5".to_string();

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    assert!(toml_str.contains("kind = \"window\""));

    let mut parsed: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed);
}

#[test]
fn partial_file_uses_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [llm]
        model = "deepseek-chat"
        "#,
    )
    .expect("partial config should parse");

    assert_eq!(parsed.llm.model, "deepseek-chat");
    assert_eq!(parsed.llm.api_base, "https://api.openai.com/v1");
    assert_eq!(parsed.ollama, OllamaConfig::default());
}

#[test]
fn single_value_checks() {
    assert!(check::protocol("https").is_ok());
    assert!(matches!(check::protocol("ftp"), Err(ConfigError::InvalidProtocol(p)) if p == "ftp"));
    assert!(check::port(8080).is_ok());
    assert!(matches!(check::port(0), Err(ConfigError::InvalidPort)));
    assert!(matches!(check::model("  "), Err(ConfigError::EmptyModel)));
    assert!(check::batch_size(1000).is_ok());
    assert!(check::batch_size(0).is_err());
    assert!(check::batch_size(1001).is_err());
    assert!(check::embedding_dimension(32).is_err());
    assert!(check::http_url("http://localhost:8000/v1").is_ok());
    assert!(check::http_url("ftp://example.com").is_err());
    assert!(check::http_url("not a url").is_err());
    assert!(check::max_iterations(0).is_err());

    let err = check::temperature(-1.0).expect_err("below range");
    assert_eq!(err.to_string(), "temperature = -1 is out of range (0..=2)");
}

#[test]
fn load_missing_file_gives_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("missing config should load");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.llm, LlmConfig::default());
}

#[test]
fn save_and_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let base = temp_dir.path().join("nested").join("lab");

    let mut config = Config::load(&base).expect("should load defaults");
    config.ollama.port = 12345;
    config.llm.temperature = 0.3;
    config.save().expect("should save config");

    assert!(base.join("config.toml").exists());

    let loaded = Config::load(&base).expect("should load saved config");
    assert_eq!(loaded, config);
    assert_eq!(loaded.database_path(), base.join("knowledge.db"));
    assert_eq!(loaded.vector_database_path(), base.join("vectors"));
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[ollama]\nport = 0\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn base_dir_env_override() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    // SAFETY: serialised with other env-mutating tests.
    unsafe { std::env::set_var(BASE_DIR_ENV, temp_dir.path()) };
    let dir = Config::default_base_dir();
    // SAFETY: as above.
    unsafe { std::env::remove_var(BASE_DIR_ENV) };

    assert_eq!(dir.expect("env dir should resolve"), temp_dir.path());
}
