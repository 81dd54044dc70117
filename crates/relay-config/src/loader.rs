// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/relay/config.yaml"));
    paths.push(PathBuf::from("/etc/relay/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/relay/config.yaml"));
        paths.push(home.join(".config/relay/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("relay/config.yaml"));
        paths.push(cfg.join("relay/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".relay/config.yaml"));
    paths.push(PathBuf::from(".relay/config.yml"));
    paths.push(PathBuf::from(".relay.yaml"));
    paths.push(PathBuf::from(".relay.yml"));
    paths.push(PathBuf::from("relay.yaml"));
    paths.push(PathBuf::from("relay.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment variable overrides.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables always win over file-based config
/// (`POSTGRES_*`, `QDRANT_*`, `RELAY_MAIN_MODEL`, `RELAY_SUB_MODEL`,
/// `LOG_LEVEL`). Secrets never live in the YAML layers.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("LOG_LEVEL") {
        config.server.log_level = v;
    }
    if let Ok(v) = std::env::var("RELAY_AUTH_TOKEN") {
        config.server.auth_token = Some(v);
    }
    if let Ok(v) = std::env::var("RELAY_MAIN_MODEL") {
        config.model.main_model = v;
    }
    if let Ok(v) = std::env::var("RELAY_SUB_MODEL") {
        config.model.sub_model = v;
    }
    if let Ok(v) = std::env::var("QDRANT_URL") {
        config.memory.qdrant_url = v;
    } else {
        let host = std::env::var("QDRANT_HOST").ok();
        let port = std::env::var("QDRANT_PORT").ok();
        if let Some(host) = host {
            let port = port.unwrap_or_else(|| "6333".to_string());
            config.memory.qdrant_url = format!("http://{host}:{port}");
        }
    }
    if let Ok(v) = std::env::var("QDRANT_COLLECTION") {
        config.memory.collection = v;
    }

    if let Ok(v) = std::env::var("POSTGRES_URL") {
        config.database.url = v;
    } else if let (Ok(host), Ok(db), Ok(user), Ok(pass)) = (
        std::env::var("POSTGRES_HOST"),
        std::env::var("POSTGRES_DB"),
        std::env::var("POSTGRES_USER"),
        std::env::var("POSTGRES_PASSWORD"),
    ) {
        let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
        config.database.url = format!("postgres://{user}:{pass}@{host}:{port}/{db}");
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes env-var-touching tests; std::env::set_var is process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("database:\n  url: postgres://a\n  pool_max: 5");
        let src = val("database:\n  pool_max: 9");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["database"]["url"].as_str(), Some("postgres://a"));
        assert_eq!(dst["database"]["pool_max"].as_i64(), Some(9));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/relay_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_extra_path_returns_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        let cfg = load(None).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        let _g = ENV_LOCK.lock().unwrap();
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "server:\n  port: 9090\ndatabase:\n  url: postgres://x/y").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.database.url, "postgres://x/y");
    }

    #[test]
    fn env_var_overrides_file_value() {
        let _g = ENV_LOCK.lock().unwrap();
        std::env::set_var("RELAY_MAIN_MODEL", "gemini-2.0-pro");
        let cfg = load(None).unwrap();
        assert_eq!(cfg.model.main_model, "gemini-2.0-pro");
        std::env::remove_var("RELAY_MAIN_MODEL");
    }

    #[test]
    fn auth_token_is_only_set_via_env() {
        let _g = ENV_LOCK.lock().unwrap();
        assert!(load(None).unwrap().server.auth_token.is_none());
        std::env::set_var("RELAY_AUTH_TOKEN", "s3cret");
        let cfg = load(None).unwrap();
        assert_eq!(cfg.server.auth_token.as_deref(), Some("s3cret"));
        std::env::remove_var("RELAY_AUTH_TOKEN");
    }
}
