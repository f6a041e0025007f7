//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`JdebugSettings::default()`]
//! 2. If `~/.jdebug/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `JDEBUG_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{JdebugSettings, TransportKind};

/// Resolve the path to the settings file (`~/.jdebug/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".jdebug").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<JdebugSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<JdebugSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<JdebugSettings> {
    let defaults = serde_json::to_value(JdebugSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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

/// Apply `JDEBUG_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut JdebugSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are ignored with a warning and fall back to file/default.
pub fn apply_overrides_from(settings: &mut JdebugSettings, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = &lookup;

    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = read_env(lookup, "JDEBUG_API_URL", |v| Some(v.to_string())) {
        settings.api.base_url = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_REQUEST_TIMEOUT_MS", |v| parse_u64_range(v, 100, 600_000)) {
        settings.api.request_timeout_ms = v;
    }

    // ── Stream ──────────────────────────────────────────────────────
    if let Some(v) = read_env(lookup, "JDEBUG_TRANSPORT", TransportKind::parse) {
        settings.stream.transport = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_WS_URL", |v| Some(v.to_string())) {
        settings.stream.ws_url = Some(v);
    }
    if let Some(v) = read_env(lookup, "JDEBUG_SOCKJS", parse_bool) {
        settings.stream.sockjs = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_TOPIC_PREFIX", |v| Some(v.to_string())) {
        settings.stream.topic_prefix = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_RECONNECT_DELAY_MS", |v| parse_u64_range(v, 10, 600_000)) {
        settings.stream.reconnect_delay_ms = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_CONNECT_TIMEOUT_MS", |v| parse_u64_range(v, 100, 600_000)) {
        settings.stream.connect_timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env(lookup, "JDEBUG_LOG_LEVEL", |v| Some(v.to_string())) {
        settings.logging.level = v;
    }
    if let Some(v) = read_env(lookup, "JDEBUG_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

fn read_env<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = lookup(name).filter(|v| !v.is_empty())?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
