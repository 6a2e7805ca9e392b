// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backing stores for the Colloquy conversation store.
//!
//! Two implementations of [`StorageAdapter`] with one list-operation
//! semantics:
//!
//! - [`SqliteStore`]: WAL-mode SQLite with embedded migrations. Safe to share
//!   between processes on one host. Each [`colloquy_core::ListOp`] becomes
//!   positional SQL, so a batch touches only the rows it changes.
//! - [`MemoryStore`]: a mutex-guarded map for tests and single-process use,
//!   running batches through [`colloquy_core::apply_list_ops`].
//!
//! Both hand out list revisions from one store-wide counter and remove a
//! key outright once it is emptied, deleted or expired.

use std::sync::Arc;

use colloquy_config::model::{StorageBackend, StorageConfig};
use colloquy_core::{ColloquyError, StorageAdapter};

pub mod database;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use database::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Build and initialize the backend selected by `config`.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>, ColloquyError> {
    let store: Arc<dyn StorageAdapter> = match config.backend {
        StorageBackend::Sqlite => Arc::new(SqliteStore::new(config.clone())),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    store.initialize().await?;
    tracing::info!(backend = store.name(), "storage ready");
    Ok(store)
}
