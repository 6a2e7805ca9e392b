// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local implementation of the StorageAdapter trait.
//!
//! Every call takes one async mutex, which makes each call atomic with
//! respect to every other call in this process. Expiry is evaluated against
//! the tokio clock so paused-time tests can drive it. Emptied, deleted and
//! expired keys are removed from the maps rather than kept as tombstones.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use colloquy_core::{
    AdapterType, ColloquyError, HealthStatus, ListOp, PluginAdapter, Revision, StorageAdapter,
    Versioned, apply_list_ops,
};

#[derive(Debug)]
struct ListEntry {
    items: Vec<String>,
    revision: u64,
    expires_at: Option<Instant>,
}

impl ListEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct ValueEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    lists: HashMap<String, ListEntry>,
    values: HashMap<String, ValueEntry>,
    /// Last revision handed out to any list. Never reused.
    last_revision: u64,
}

impl Inner {
    /// The live list at `key`. An expired one is removed on the way.
    fn live_list(&mut self, key: &str, now: Instant) -> Option<&ListEntry> {
        if self.lists.get(key).is_some_and(|e| !e.is_live(now)) {
            self.lists.remove(key);
        }
        self.lists.get(key)
    }

    /// The live value at `key`. An expired one is removed on the way.
    fn live_value(&mut self, key: &str, now: Instant) -> Option<&ValueEntry> {
        if self.values.get(key).is_some_and(|v| v.expires_at <= now) {
            self.values.remove(key);
        }
        self.values.get(key)
    }

    fn next_revision(&mut self) -> u64 {
        self.last_revision += 1;
        self.last_revision
    }
}

/// In-memory store. Shared between tasks of one process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn key_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.lists.len() + inner.values.len()
    }
}

#[async_trait]
impl PluginAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ColloquyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ColloquyError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStore {
    async fn initialize(&self) -> Result<(), ColloquyError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ColloquyError> {
        Ok(())
    }

    async fn read_list(&self, key: &str) -> Result<Versioned<Vec<String>>, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(match inner.live_list(key, now) {
            Some(entry) => Versioned {
                value: entry.items.clone(),
                revision: Revision(entry.revision),
            },
            None => Versioned {
                value: Vec::new(),
                revision: Revision::default(),
            },
        })
    }

    async fn apply(
        &self,
        key: &str,
        ops: Vec<ListOp>,
        guard: Option<Revision>,
    ) -> Result<Revision, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let current = inner.live_list(key, now).map_or(0, |e| e.revision);

        if guard.is_some_and(|expected| expected.0 != current) {
            return Err(ColloquyError::Conflict {
                key: key.to_string(),
            });
        }
        if ops.is_empty() {
            return Ok(Revision(current));
        }

        let (mut items, previous_expiry) = match inner.lists.remove(key) {
            Some(entry) => (entry.items, entry.expires_at),
            None => (Vec::new(), None),
        };
        let effect = apply_list_ops(&mut items, &ops);
        if items.is_empty() {
            return Ok(Revision::default());
        }
        let expires_at = effect.resolve(false, previous_expiry, |ttl| now + ttl);
        let revision = inner.next_revision();
        inner.lists.insert(
            key.to_string(),
            ListEntry {
                items,
                revision,
                expires_at,
            },
        );
        Ok(Revision(revision))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        if inner.live_value(key, now).is_some() {
            return Ok(false);
        }
        inner.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner.live_value(key, now).map(|v| v.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let matches = inner
            .live_value(key, now)
            .is_some_and(|v| v.value == expected);
        if matches {
            inner.values.remove(key);
        }
        Ok(matches)
    }

    async fn purge_expired(&self) -> Result<usize, ColloquyError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let before = inner.lists.len() + inner.values.len();
        inner.lists.retain(|_, entry| entry.is_live(now));
        inner.values.retain(|_, value| value.expires_at > now);
        Ok(before - inner.lists.len() - inner.values.len())
    }
}
