// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./colloquy.toml` > `~/.config/colloquy/colloquy.toml`
//! > `/etc/colloquy/colloquy.toml`, with environment variable overrides via the
//! `COLLOQUY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ColloquyConfig;

/// Prefix of every environment override.
pub(crate) const ENV_PREFIX: &str = "COLLOQUY_";

/// Sections that env var keys are split on, in match order.
const SECTIONS: &[&str] = &["server", "session", "lock", "retention", "storage", "openai"];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/colloquy/colloquy.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "colloquy.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("colloquy/colloquy.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/colloquy/colloquy.toml` (system-wide)
/// 3. `~/.config/colloquy/colloquy.toml` (user XDG config)
/// 4. `./colloquy.toml` (local directory)
/// 5. `COLLOQUY_*` environment variables
pub fn load_config() -> Result<ColloquyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ColloquyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ColloquyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ColloquyConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `COLLOQUY_LOCK_LEASE_TTL_MS` must map to `lock.lease_ttl_ms`,
/// not `lock.lease.ttl.ms`.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
        .map(|key| env_key_to_path(&key.as_str().to_ascii_lowercase()).into())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config path.
pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_on_first_underscore_only() {
        assert_eq!(env_key_to_path("lock_lease_ttl_ms"), "lock.lease_ttl_ms");
        assert_eq!(env_key_to_path("retention_max_chars"), "retention.max_chars");
        assert_eq!(env_key_to_path("openai_api_key"), "openai.api_key");
        assert_eq!(env_key_to_path("session_ttl_secs"), "session.ttl_secs");
        assert_eq!(
            env_key_to_path("storage_sweep_interval_secs"),
            "storage.sweep_interval_secs"
        );
    }

    #[test]
    fn unknown_env_sections_pass_through() {
        assert_eq!(env_key_to_path("telemetry_level"), "telemetry_level");
    }
}
