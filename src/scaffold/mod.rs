//! Project bootstrap: directory layout, template files and `.env` checks.


pub mod templates;

use crate::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DIRECTORIES: [&str; 8] = [
    "data/uploads",
    "data/vector_db",
    "data/cache",
    "logs",
    "mcp_services/rag_service",
    "mcp_services/file_service",
    "mcp_services/math_service",
    "notes",
];

pub const VENV_DIR: &str = ".venv";
pub use crate::config::API_KEY_MARKER;

/// Printed whenever no usable key is found
pub const ENV_HINT: &str = "💡 cp .env.example .env，然后设置 OPENAI_API_KEY=sk-...";

/// What a scaffold run touched, relative to the project root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub root: PathBuf,
    pub created: Vec<PathBuf>,
    pub overwritten: Vec<PathBuf>,
    pub venv_reset: bool,
}

impl fmt::Display for ScaffoldReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📁 项目目录：{}", self.root.display())?;
        for path in &self.created {
            writeln!(f, "  ✅ 创建 {}", path.display())?;
        }
        for path in &self.overwritten {
            writeln!(f, "  ♻️ 覆盖 {}", path.display())?;
        }
        if self.venv_reset {
            writeln!(f, "  ♻️ 重建 {}", VENV_DIR)?;
        }
        write!(f, "💡 下一步：复制 .env.example 到 .env 并设置 OPENAI_API_KEY")
    }
}

/// Lay out a project under `root`. Safe to run repeatedly.
#[inline]
pub fn scaffold(root: &Path) -> Result<ScaffoldReport> {
    info!("Scaffolding project at {}", root.display());
    std::fs::create_dir_all(root)?;

    let mut report = ScaffoldReport {
        root: root.to_path_buf(),
        ..ScaffoldReport::default()
    };

    for dir in DIRECTORIES {
        let path = root.join(dir);
        if !path.is_dir() {
            std::fs::create_dir_all(&path)?;
            report.created.push(PathBuf::from(dir));
        }
    }

    for (name, contents) in templates::FILES {
        let path = root.join(name);
        let existed = path.exists();
        std::fs::write(&path, contents)?;
        debug!("Wrote {}", path.display());
        if existed {
            report.overwritten.push(PathBuf::from(name));
        } else {
            report.created.push(PathBuf::from(name));
        }
    }

    let venv = root.join(VENV_DIR);
    if venv.exists() {
        std::fs::remove_dir_all(&venv)?;
        report.venv_reset = true;
        info!("Removed existing {}", venv.display());
    } else {
        report.created.push(PathBuf::from(VENV_DIR));
    }
    std::fs::create_dir_all(&venv)?;

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Configured,
    MissingKey,
    MissingFile,
}

impl EnvStatus {
    #[inline]
    pub fn is_configured(self) -> bool {
        self == Self::Configured
    }

    #[inline]
    pub fn message(self) -> &'static str {
        match self {
            Self::Configured => "✅ API密钥已配置",
            Self::MissingKey => "⚠️ 请在 .env 文件中设置 OPENAI_API_KEY",
            Self::MissingFile => "❌ .env 文件不存在，请复制 .env.example 到 .env 并设置 OPENAI_API_KEY",
        }
    }
}

/// A file counts as configured when it holds something that looks like a key
#[inline]
pub fn check_env(path: &Path) -> EnvStatus {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.contains(API_KEY_MARKER) => EnvStatus::Configured,
        Ok(_) => EnvStatus::MissingKey,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            EnvStatus::MissingFile
        }
    }
}
