//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `LSPBRIDGE_*` environment variable overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use lspbridge_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::BridgeSettings;

/// Resolve the default settings file path (`~/.lspbridge/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".lspbridge").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    load_with_env(path, |name| std::env::var(name).ok())
}

/// Load settings from `path`, reading overrides through `env`.
pub fn load_with_env<F>(path: &Path, env: F) -> Result<BridgeSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BridgeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `LSPBRIDGE_*` overrides read through `env`.
///
/// Invalid values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut BridgeSettings, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader(env);

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("LSPBRIDGE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("LSPBRIDGE_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("LSPBRIDGE_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, 100_000)
    }) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("LSPBRIDGE_HEARTBEAT_INTERVAL_SECS", |s| {
        parse_u64_range(s, 1, 3600)
    }) {
        settings.server.heartbeat_interval_secs = v;
        if settings.server.heartbeat_timeout_secs < v {
            settings.server.heartbeat_timeout_secs = v.saturating_mul(3);
        }
    }

    // ── Process ─────────────────────────────────────────────────────
    if let Some(v) = env.raw("LSPBRIDGE_COMMAND") {
        // Empty is meaningful: run the server path directly.
        settings.process.command = v;
    }
    if let Some(v) = env.parsed("LSPBRIDGE_TERMINATE_GRACE_MS", |s| {
        parse_u64_range(s, 0, 600_000)
    }) {
        settings.process.terminate_grace_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LSPBRIDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("LSPBRIDGE_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F>(F);

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.raw(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use serde_json::json;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = json!({"server": {"host": "127.0.0.1", "port": 5007}});
        let source = json!({"server": {"port": 6000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"server": {"host": "127.0.0.1", "port": 6000}}));
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"args": ["-Xmx2G", "-jar"]}), json!({"args": ["-jar"]}));
        assert_eq!(merged["args"], json!(["-jar"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"level": "info"}), json!({"level": null}));
        assert_eq!(merged["level"], "info");
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"x": {"y": 1}}), json!({"x": 5}));
        assert_eq!(merged["x"], 5);
    }

    // ── load_with_env ───────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_with_env(Path::new("/nonexistent/settings.json"), no_env).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "process": {"command": "node", "args": []}}"#,
        )
        .unwrap();

        let settings = load_with_env(&path, no_env).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.process.command, "node");
        assert!(settings.process.args.is_empty());
        assert_eq!(settings.process.terminate_grace_ms, 2000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let err = load_with_env(&path, no_env).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "high"}}"#).unwrap();

        assert!(matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"maxConnections": 0}}"#).unwrap();

        assert!(matches!(
            load_with_env(&path, no_env),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_beat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9090}}"#).unwrap();

        let env = env_from(&[
            ("LSPBRIDGE_PORT", "7000"),
            ("LSPBRIDGE_HOST", "0.0.0.0"),
            ("LSPBRIDGE_LOG_FORMAT", "json"),
            ("LSPBRIDGE_LOG_LEVEL", "debug"),
        ]);
        let settings = load_with_env(&path, env).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = BridgeSettings::default();
        apply_overrides(
            &mut settings,
            env_from(&[
                ("LSPBRIDGE_PORT", "0"),
                ("LSPBRIDGE_MAX_CONNECTIONS", "lots"),
                ("LSPBRIDGE_LOG_FORMAT", "xml"),
                ("LSPBRIDGE_HOST", ""),
            ]),
        );
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn empty_command_env_means_direct_execution() {
        let mut settings = BridgeSettings::default();
        apply_overrides(&mut settings, env_from(&[("LSPBRIDGE_COMMAND", "")]));
        assert_eq!(settings.process.command, "");
    }

    #[test]
    fn heartbeat_interval_env_keeps_timeout_consistent() {
        let mut settings = BridgeSettings::default();
        apply_overrides(
            &mut settings,
            env_from(&[("LSPBRIDGE_HEARTBEAT_INTERVAL_SECS", "120")]),
        );
        assert_eq!(settings.server.heartbeat_interval_secs, 120);
        assert_eq!(settings.server.heartbeat_timeout_secs, 360);
        settings.validate().unwrap();
    }

    #[test]
    fn grace_env_accepts_zero() {
        let mut settings = BridgeSettings::default();
        apply_overrides(
            &mut settings,
            env_from(&[("LSPBRIDGE_TERMINATE_GRACE_MS", "0")]),
        );
        assert_eq!(settings.process.terminate_grace_ms, 0);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range(" 80 ", 1, 65535), Some(80));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 10, 20), None);
        assert_eq!(parse_usize_range("abc", 0, 10), None);
        assert_eq!(parse_usize_range("10", 0, 10), Some(10));
    }

    #[test]
    fn settings_path_is_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".lspbridge/settings.json"));
    }
}
