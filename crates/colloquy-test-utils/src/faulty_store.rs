// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage wrapper that injects failures into list commits.
//!
//! Wraps any `StorageAdapter` and delegates to it, except that the next N
//! `apply` calls can be made to fail with a conflict or a store error
//! before they reach the inner store, and the next N lease releases can be
//! made to fail with a store error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use colloquy_core::{
    AdapterType, ColloquyError, HealthStatus, ListOp, PluginAdapter, Revision, StorageAdapter,
    Versioned,
};

pub struct FaultyStore {
    inner: Arc<dyn StorageAdapter>,
    conflicts: AtomicU32,
    failures: AtomicU32,
    release_failures: AtomicU32,
    applies: AtomicU32,
    reads: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn StorageAdapter>) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            release_failures: AtomicU32::new(0),
            applies: AtomicU32::new(0),
            reads: AtomicU32::new(0),
        }
    }

    /// Make the next `n` list commits fail with [`ColloquyError::Conflict`].
    pub fn conflict_next(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` list commits fail with a storage error.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `compare_and_delete` calls fail with a storage error.
    pub fn fail_releases_next(&self, n: u32) {
        self.release_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `apply` calls seen, including injected failures.
    pub fn apply_calls(&self) -> u32 {
        self.applies.load(Ordering::SeqCst)
    }

    /// Number of `read_list` calls seen.
    pub fn read_calls(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PluginAdapter for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ColloquyError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ColloquyError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StorageAdapter for FaultyStore {
    async fn initialize(&self) -> Result<(), ColloquyError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), ColloquyError> {
        self.inner.close().await
    }

    async fn read_list(&self, key: &str) -> Result<Versioned<Vec<String>>, ColloquyError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_list(key).await
    }

    async fn apply(
        &self,
        key: &str,
        ops: Vec<ListOp>,
        guard: Option<Revision>,
    ) -> Result<Revision, ColloquyError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.conflicts) {
            return Err(ColloquyError::Conflict {
                key: key.to_string(),
            });
        }
        if Self::take(&self.failures) {
            return Err(ColloquyError::Storage {
                source: "injected store failure".into(),
            });
        }
        self.inner.apply(key, ops, guard).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, ColloquyError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, ColloquyError> {
        self.inner.get_value(key).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ColloquyError> {
        if Self::take(&self.release_failures) {
            return Err(ColloquyError::Storage {
                source: "injected release failure".into(),
            });
        }
        self.inner.compare_and_delete(key, expected).await
    }

    async fn purge_expired(&self) -> Result<usize, ColloquyError> {
        self.inner.purge_expired().await
    }
}
