//! Centralized defaults + env overrides.
//!
//! Goal: prevent scattered hardcodes (models/base URLs/paths) that silently
//! drift. Env vars (preferred):
//!
//! - `OPENCLAW_MEM_DB`
//! - `OPENCLAW_MEM_HOME`
//! - `OPENCLAW_MEM_STATE_DIR`
//! - `OPENCLAW_MEM_CONFIG_PATH`
//! - `OPENCLAW_MEM_OPENAI_BASE_URL`
//! - `OPENCLAW_MEM_EMBED_MODEL`
//! - `OPENCLAW_MEM_SUMMARY_MODEL`
//! - `OPENCLAW_MEM_RERANK_MODEL`
//! - `OPENCLAW_MEM_IMPORTANCE_SCORER`
//!
//! These are intentionally narrow and stable.

use std::path::PathBuf;

use directories::ProjectDirs;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-5.2";
pub const DEFAULT_RERANK_MODEL: &str = "jina-reranker-v2-base-multilingual";

fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn openai_base_url() -> String {
    env_or("OPENCLAW_MEM_OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)
}

pub fn embed_model() -> String {
    env_or("OPENCLAW_MEM_EMBED_MODEL", DEFAULT_EMBED_MODEL)
}

pub fn summary_model() -> String {
    env_or("OPENCLAW_MEM_SUMMARY_MODEL", DEFAULT_SUMMARY_MODEL)
}

pub fn rerank_model() -> String {
    env_or("OPENCLAW_MEM_RERANK_MODEL", DEFAULT_RERANK_MODEL)
}

/// Importance scorer setting from the environment, if any.
pub fn importance_scorer() -> Option<String> {
    env_opt("OPENCLAW_MEM_IMPORTANCE_SCORER")
}

/// Home directory for state: `OPENCLAW_MEM_HOME` > `$HOME/.openclaw/memory`
/// > platform data dir.
pub fn memory_home() -> PathBuf {
    if let Some(home) = env_opt("OPENCLAW_MEM_HOME") {
        return PathBuf::from(home);
    }
    if let Some(home) = env_opt("HOME") {
        return PathBuf::from(home).join(".openclaw").join("memory");
    }
    ProjectDirs::from("ai", "openclaw", "openclaw-mem")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".openclaw-mem"))
}

/// Default SQLite ledger path: `OPENCLAW_MEM_DB` > `<home>/openclaw-mem.sqlite`.
pub fn db_path() -> PathBuf {
    if let Some(db) = env_opt("OPENCLAW_MEM_DB") {
        return PathBuf::from(db);
    }
    memory_home().join("openclaw-mem.sqlite")
}

/// State directory for triage/capture JSON: `OPENCLAW_MEM_STATE_DIR` > home.
pub fn state_dir() -> PathBuf {
    env_opt("OPENCLAW_MEM_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(memory_home)
}

/// Config file path: `OPENCLAW_MEM_CONFIG_PATH` > `<home>/config.json`.
pub fn config_path() -> PathBuf {
    env_opt("OPENCLAW_MEM_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| memory_home().join("config.json"))
}

/// Default Markdown index artifact path.
pub fn index_path() -> PathBuf {
    memory_home().join("index.md")
}

/// Default harvest log path.
pub fn harvest_source() -> PathBuf {
    memory_home().join("openclaw-mem-observations.jsonl")
}

/// Resolve the API key: explicit flag > `OPENAI_API_KEY` env > config file
/// (`{"api_key": "..."}` or `{"openai": {"api_key": "..."}}`).
pub fn resolve_api_key(flag: Option<&str>) -> Option<String> {
    if let Some(k) = flag {
        let k = k.trim();
        if !k.is_empty() {
            return Some(k.to_string());
        }
    }
    if let Some(k) = env_opt("OPENAI_API_KEY") {
        return Some(k);
    }

    let path = config_path();
    let raw = std::fs::read_to_string(path).ok()?;
    let cfg: serde_json::Value = serde_json::from_str(&raw).ok()?;
    let key = cfg
        .get("api_key")
        .and_then(|v| v.as_str())
        .or_else(|| {
            cfg.get("openai")
                .and_then(|o| o.get("api_key"))
                .and_then(|v| v.as_str())
        })?
        .trim()
        .to_string();
    (!key.is_empty()).then_some(key)
}
