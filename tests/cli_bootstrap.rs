#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Runs the built binary for the commands that need no network

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn agent_lab(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agent-lab"))
        .arg("--base-dir")
        .arg(home)
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPENAI_KEY")
        .env("RUST_LOG", "warn")
        .current_dir(home)
        .output()
        .expect("binary runs")
}

#[test]
fn init_twice_then_check_env() {
    let home = TempDir::new().expect("tempdir");
    let project = home.path().join("project");
    let project_arg = project.to_str().expect("utf-8 path");

    let first = agent_lab(home.path(), &["init", project_arg]);
    assert!(first.status.success());
    let stdout = String::from_utf8_lossy(&first.stdout);
    assert!(stdout.contains("创建 data/vector_db"));
    assert!(project.join("mcp_services/rag_service").is_dir());
    assert!(project.join(".venv").is_dir());

    std::fs::write(project.join(".venv").join("marker"), "x").expect("write");
    let second = agent_lab(home.path(), &["init", project_arg]);
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("重建 .venv"));
    assert!(!project.join(".venv").join("marker").exists());

    let env_file = project.join(".env");
    let env_arg = env_file.to_str().expect("utf-8 path");

    let missing = agent_lab(home.path(), &["check-env", "--file", env_arg]);
    assert_eq!(missing.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&missing.stderr).contains(".env 文件不存在"));

    std::fs::copy(project.join(".env.example"), &env_file).expect("copy");
    let placeholder = agent_lab(home.path(), &["check-env", "--file", env_arg]);
    assert_eq!(placeholder.status.code(), Some(1));

    std::fs::write(&env_file, "OPENAI_API_KEY=sk-live-key\n").expect("write");
    let configured = agent_lab(home.path(), &["check-env", "--file", env_arg]);
    assert!(configured.status.success());
    assert!(String::from_utf8_lossy(&configured.stdout).contains("API密钥已配置"));
}

#[test]
fn llm_commands_fail_without_key() {
    let home = TempDir::new().expect("tempdir");
    let output = agent_lab(home.path(), &["agent", "25*4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("OPENAI_API_KEY"));
}

#[test]
fn llm_commands_reject_template_key() {
    let home = TempDir::new().expect("tempdir");
    std::fs::write(
        home.path().join(".env"),
        "OPENAI_API_KEY=your-openai-api-key-here\n",
    )
    .expect("write");

    for args in [&["agent", "25*4"][..], &["workflow", "Rust"][..], &["ask", "什么是RAG？"][..]] {
        let output = agent_lab(home.path(), args);
        assert_eq!(output.status.code(), Some(1), "{:?}", args);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("OPENAI_API_KEY=sk-"), "{:?}: {}", args, stderr);
    }
}

#[test]
fn config_show_prints_defaults() {
    let home = TempDir::new().expect("tempdir");
    let output = agent_lab(home.path(), &["config", "--show"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("gpt-3.5-turbo"));
    assert!(stderr.contains("API Key:"));
}
