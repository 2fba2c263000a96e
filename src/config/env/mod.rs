
use std::path::{Path, PathBuf};
use tracing::debug;

pub const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "OPENAI_KEY"];

/// Real keys carry this prefix; template placeholders do not
pub const API_KEY_MARKER: &str = "sk-";

/// Where an API key was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeySource {
    Env(&'static str),
}

/// Load `path` (or `.env` searched upward from the working directory) into
/// the process environment. Existing variables are left untouched.
///
/// Returns the file that was loaded, if any.
#[inline]
pub fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(file) => {
            debug!("Loaded environment from {}", file.display());
            Some(file)
        }
        Err(e) => {
            debug!("No .env loaded: {}", e);
            None
        }
    }
}

/// First API key in the environment that contains [`API_KEY_MARKER`].
/// Blank values and placeholders such as the `.env.example` one are skipped.
#[inline]
pub fn resolve_api_key() -> Option<(String, ApiKeySource)> {
    API_KEY_VARS.iter().find_map(|name| {
        let value = std::env::var(name).ok()?.trim().to_string();
        if value.is_empty() {
            return None;
        }
        if !value.contains(API_KEY_MARKER) {
            debug!("Ignoring {}: value does not look like an API key", name);
            return None;
        }
        Some((value, ApiKeySource::Env(name)))
    })
}
