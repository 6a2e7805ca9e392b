// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive budgets, ordered timeouts, and non-empty key prefixes.

use crate::diagnostic::ConfigError;
use crate::model::{ColloquyConfig, StorageBackend};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ColloquyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut require_positive = |name: &str, value: u64| {
        if value == 0 {
            errors.push(ConfigError::invalid(
                name,
                format!("{name} must be at least 1, got 0"),
            ));
        }
    };

    require_positive("session.ttl_secs", config.session.ttl_secs);
    require_positive("session.conflict_retries", config.session.conflict_retries.into());
    require_positive("session.insert_retries", config.session.insert_retries.into());
    require_positive("lock.lease_ttl_ms", config.lock.lease_ttl_ms);
    require_positive("lock.wait_ms", config.lock.wait_ms);
    require_positive("lock.poll_interval_ms", config.lock.poll_interval_ms);
    require_positive("retention.max_turns", config.retention.max_turns as u64);
    require_positive("retention.max_chars", config.retention.max_chars as u64);
    require_positive("openai.timeout_secs", config.openai.timeout_secs);
    require_positive("storage.sweep_interval_secs", config.storage.sweep_interval_secs);

    if config.lock.poll_interval_ms >= config.lock.wait_ms && config.lock.wait_ms > 0 {
        errors.push(ConfigError::invalid(
            "lock.poll_interval_ms",
            format!(
                "lock.poll_interval_ms ({}) must be shorter than lock.wait_ms ({})",
                config.lock.poll_interval_ms, config.lock.wait_ms
            ),
        ));
    }

    if config.session.key_prefix.is_empty() {
        errors.push(ConfigError::invalid(
            "session.key_prefix",
            "session.key_prefix must not be empty",
        ));
    }

    if config.lock.key_prefix.is_empty() {
        errors.push(ConfigError::invalid(
            "lock.key_prefix",
            "lock.key_prefix must not be empty",
        ));
    }

    // Leases and transcripts share one keyspace.
    if !config.lock.key_prefix.is_empty() && config.lock.key_prefix == config.session.key_prefix {
        errors.push(ConfigError::invalid(
            "lock.key_prefix",
            "lock.key_prefix must differ from session.key_prefix",
        ));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        errors.push(ConfigError::invalid(
            "storage.database_path",
            "storage.database_path must not be empty",
        ));
    }

    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "server.host",
            "server.host must not be empty",
        ));
    }

    if !(0.0..=2.0).contains(&config.openai.temperature) {
        errors.push(ConfigError::invalid(
            "openai.temperature",
            format!(
                "openai.temperature must be within 0.0..=2.0, got {}",
                config.openai.temperature
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
