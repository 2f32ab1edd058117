//! Bootstrap helpers for medresearch.
//!
//! Secrets such as `GEMINI_API_KEY` and `DATA_API_KEY` live in
//! `~/.medresearch/.env` rather than in `config.toml`, so they are loaded
//! into the process environment before configuration is resolved.
//!
//! File: `~/.medresearch/.env` (standard dotenvy format)

use std::path::{Path, PathBuf};

use crate::settings::Settings;

/// Path to the application `.env` file: `~/.medresearch/.env`.
pub fn home_env_path() -> PathBuf {
    Settings::home_dir().join(".env")
}

/// Load env vars from `./.env` and then `~/.medresearch/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.medresearch/.env`
pub fn load_env_files() {
    let _ = dotenvy::dotenv();

    let path = home_env_path();
    if path.exists()
        && let Err(e) = dotenvy::from_path(&path)
    {
        tracing::warn!("Failed to load {}: {}", path.display(), e);
    }
}

/// Render `KEY="value"` lines, escaping so values cannot break out of quotes.
fn render_env_lines(vars: &[(&str, &str)]) -> String {
    let mut content = String::new();
    for (key, value) in vars {
        // A value containing `"\nINJECTED="x` must stay inside its quotes.
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    content
}

/// Write env vars to a dotenv file, creating the parent directory.
pub fn write_env_file(path: &Path, vars: &[(&str, &str)]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_env_lines(vars))
}
