//! # Runtime Configuration Module
//!
//! Engine settings: continuation lifetime and purge policy, coroutine stack
//! size, the parameter and cookie names used to carry continuation ids, and
//! fault rendering.
//!
//! ## Sources
//!
//! - [`EngineConfig::default()`]
//! - [`EngineConfig::from_env()`]: `BRRTE_*` variables over the defaults
//! - [`EngineConfig::from_file()`]: YAML, or TOML when the extension is `.toml`
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `BRRTE_CONTINUATION_DURATION_MS` | `continuation_duration_ms` | `1200000` (20 min) |
//! | `BRRTE_PURGE_FREQUENCY` | `purge_frequency` | `20` |
//! | `BRRTE_PURGE_SCALE` | `purge_scale` | `1000` |
//! | `BRRTE_REAPER_INTERVAL_MS` | `reaper_interval_ms` | unset |
//! | `BRRTE_STACK_SIZE` | `stack_size` | `0x40000` |
//! | `BRRTE_CONTINUATION_PARAM` | `continuation_param` | `contId` |
//! | `BRRTE_CONTINUATION_COOKIE` | `continuation_cookie` | `continuationId` |
//! | `BRRTE_SESSION_COOKIE` | `session_cookie` | `session` |
//! | `BRRTE_PRETTY_EXCEPTIONS` | `pretty_exceptions` | `false` |
//!
//! `BRRTE_STACK_SIZE` accepts decimal (`262144`) or hex (`0x40000`).
//!
//! ## Stack Size
//!
//! Each paused continuation holds one coroutine stack for as long as it
//! stays paused:
//!
//! - **Memory usage**: total = stack_size × paused continuations
//! - **Stack overflows**: too small panics deep handlers; too large wastes memory

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Engine configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle budget of a paused continuation in milliseconds
    pub continuation_duration_ms: u64,
    /// Purge runs on a pause when `rand(0..purge_scale) < purge_frequency`
    pub purge_frequency: u32,
    pub purge_scale: u32,
    /// Period of the background reaper; no reaper when unset
    pub reaper_interval_ms: Option<u64>,
    /// Coroutine stack size for continuation workers, in bytes
    #[serde(deserialize_with = "deserialize_stack_size")]
    pub stack_size: usize,
    /// Query parameter that marks an explicit resume
    pub continuation_param: String,
    /// Cookie that carries the last continuation id to the client
    pub continuation_cookie: String,
    /// Cookie identifying the owner session of a continuation
    pub session_cookie: String,
    /// Append the error chain to unhandled 500 responses
    pub pretty_exceptions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continuation_duration_ms: 1_200_000,
            purge_frequency: 20,
            purge_scale: 1000,
            reaper_interval_ms: None,
            stack_size: 0x40000,
            continuation_param: "contId".to_string(),
            continuation_cookie: "continuationId".to_string(),
            session_cookie: "session".to_string(),
            pretty_exceptions: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables over the defaults.
    ///
    /// Unparseable values are ignored and the default kept.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            continuation_duration_ms: env_parse("BRRTE_CONTINUATION_DURATION_MS")
                .unwrap_or(defaults.continuation_duration_ms),
            purge_frequency: env_parse("BRRTE_PURGE_FREQUENCY").unwrap_or(defaults.purge_frequency),
            purge_scale: env_parse("BRRTE_PURGE_SCALE").unwrap_or(defaults.purge_scale),
            reaper_interval_ms: env_parse("BRRTE_REAPER_INTERVAL_MS")
                .or(defaults.reaper_interval_ms),
            stack_size: env::var("BRRTE_STACK_SIZE")
                .ok()
                .and_then(|v| parse_stack_size(&v))
                .unwrap_or(defaults.stack_size),
            continuation_param: env::var("BRRTE_CONTINUATION_PARAM")
                .unwrap_or(defaults.continuation_param),
            continuation_cookie: env::var("BRRTE_CONTINUATION_COOKIE")
                .unwrap_or(defaults.continuation_cookie),
            session_cookie: env::var("BRRTE_SESSION_COOKIE").unwrap_or(defaults.session_cookie),
            pretty_exceptions: env_parse("BRRTE_PRETTY_EXCEPTIONS")
                .unwrap_or(defaults.pretty_exceptions),
        }
    }

    /// Load configuration from a YAML or TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse TOML config {}", path.display()))?
        } else {
            serde_yaml::from_str(&raw)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?
        };
        Ok(config)
    }

    #[must_use]
    pub fn continuation_duration(&self) -> Duration {
        Duration::from_millis(self.continuation_duration_ms)
    }

    #[must_use]
    pub fn reaper_interval(&self) -> Option<Duration> {
        self.reaper_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a stack size given in decimal or `0x` hex.
#[must_use]
pub fn parse_stack_size(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

fn deserialize_stack_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(usize),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => parse_stack_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack size '{s}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.continuation_duration(), Duration::from_secs(20 * 60));
        assert_eq!(config.stack_size, 0x40000);
        assert_eq!(config.continuation_param, "contId");
        assert!(config.reaper_interval().is_none());
    }

    #[test]
    fn test_parse_stack_size() {
        assert_eq!(parse_stack_size("0x8000"), Some(0x8000));
        assert_eq!(parse_stack_size("32768"), Some(32768));
        assert_eq!(parse_stack_size("lots"), None);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: EngineConfig =
            serde_yaml::from_str("purge_frequency: 5\nstack_size: \"0x10000\"\n").unwrap();
        assert_eq!(config.purge_frequency, 5);
        assert_eq!(config.stack_size, 0x10000);
        assert_eq!(config.purge_scale, 1000);
    }
}
