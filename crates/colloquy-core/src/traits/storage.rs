// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the shared backing store.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ColloquyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ListOp, Revision, Versioned};

/// Adapter for the shared, TTL-aware key/value store behind every conversation.
///
/// Two key families live here: ordered lists of serialized records
/// (transcripts) and plain string values (leases). Implementations must make
/// each call atomic with respect to every other call on the same key, across
/// all processes sharing the store.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections, etc.).
    async fn initialize(&self) -> Result<(), ColloquyError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), ColloquyError>;

    /// Reads the whole list at `key` and the revision it was observed at.
    ///
    /// Absent and expired keys read as an empty list at revision zero. Never
    /// errors on absence.
    async fn read_list(&self, key: &str) -> Result<Versioned<Vec<String>>, ColloquyError>;

    /// Applies `ops` to the list at `key` as one atomic step.
    ///
    /// With `guard = Some(rev)`, nothing is applied and
    /// [`ColloquyError::Conflict`] is returned if the key's revision is no
    /// longer `rev`. Returns the revision after the batch: a fresh value from
    /// a store-wide counter, or zero when the batch leaves the list empty, in
    /// which case the key is removed. An empty batch returns the current
    /// revision unchanged.
    async fn apply(
        &self,
        key: &str,
        ops: Vec<ListOp>,
        guard: Option<Revision>,
    ) -> Result<Revision, ColloquyError>;

    /// Creates the string key with `value` and `ttl` unless it already exists.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, ColloquyError>;

    /// Reads a string key. Expired keys read as `None`.
    async fn get_value(&self, key: &str) -> Result<Option<String>, ColloquyError>;

    /// Deletes the string key only if its current value equals `expected`,
    /// evaluated as a single store-side step. Returns whether it was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ColloquyError>;

    /// Removes every expired list and string key. Returns how many keys went.
    async fn purge_expired(&self) -> Result<usize, ColloquyError>;
}
