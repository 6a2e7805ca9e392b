// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Colloquy.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Colloquy configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColloquyConfig {
    /// HTTP front end and logging.
    #[serde(default)]
    pub server: ServerConfig,

    /// Conversation storage and concurrency strategy.
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-conversation lease settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Transcript retention budgets.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Backing store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// OpenAI-compatible inference endpoint.
    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// How concurrent writers to one conversation are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Hold a per-conversation lease around each store mutation.
    #[default]
    Pessimistic,
    /// Commit against the revision read, retrying on conflict.
    Optimistic,
}

/// Conversation session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Sliding time-to-live of a transcript, refreshed by every write.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Prefix of transcript keys in the backing store.
    #[serde(default = "default_session_key_prefix")]
    pub key_prefix: String,

    /// System message synthesized at the head of a new conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Mutation guard strategy.
    #[serde(default)]
    pub strategy: Strategy,

    /// Attempts allowed for an optimistic update before giving up.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    /// Attempts allowed to splice a reply back after a transient failure.
    #[serde(default = "default_insert_retries")]
    pub insert_retries: u32,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            key_prefix: default_session_key_prefix(),
            system_prompt: default_system_prompt(),
            strategy: Strategy::default(),
            conflict_retries: default_conflict_retries(),
            insert_retries: default_insert_retries(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_session_key_prefix() -> String {
    "chat_session:".to_string()
}

fn default_system_prompt() -> String {
    "You are a backend assistant. Answer concisely and precisely.".to_string()
}

fn default_conflict_retries() -> u32 {
    3
}

fn default_insert_retries() -> u32 {
    3
}

/// Per-conversation lease configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Lease lifetime; a crashed holder frees the conversation after this.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    /// Admission deadline while polling for a held lease.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Delay between acquisition attempts.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Prefix of lease keys in the backing store.
    #[serde(default = "default_lock_key_prefix")]
    pub key_prefix: String,
}

impl LockConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: default_lease_ttl_ms(),
            wait_ms: default_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            key_prefix: default_lock_key_prefix(),
        }
    }
}

fn default_lease_ttl_ms() -> u64 {
    20_000
}

fn default_wait_ms() -> u64 {
    8_000
}

fn default_poll_interval_ms() -> u64 {
    80
}

fn default_lock_key_prefix() -> String {
    "chat:lock:".to_string()
}

/// Transcript retention budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Most recent turns kept (a turn is a user message plus its reply).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Character budget for the non-system part of the transcript.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_turns() -> usize {
    10
}

fn default_max_chars() -> usize {
    24_000
}

/// Backing store implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable SQLite file, shareable between processes on one host.
    #[default]
    Sqlite,
    /// Process-local, lost on restart.
    Memory,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How often expired conversations and leases are swept from the store.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl StorageConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("colloquy").join("colloquy.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("colloquy.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// OpenAI-compatible inference endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. `None` requires the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}
