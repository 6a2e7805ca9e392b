// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation leases.
//!
//! A lease is a store key created only if absent, holding a random token
//! and bounded by a TTL so a crashed holder cannot wedge a conversation.
//! Release is a store-side compare-and-delete on that token, so a holder
//! whose lease already expired and was re-acquired elsewhere releases nothing.

use std::sync::Arc;
use std::time::Duration;

use colloquy_config::model::LockConfig;
use colloquy_core::types::new_id;
use colloquy_core::{ColloquyError, ConversationKey, StorageAdapter};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn StorageAdapter>,
    key_prefix: String,
    lease_ttl: Duration,
    wait: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn StorageAdapter>, config: &LockConfig) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.clone(),
            lease_ttl: config.lease_ttl(),
            wait: config.wait(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Store key holding the lease of a conversation.
    pub fn lock_key(&self, key: &ConversationKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Single acquisition attempt. `None` when another holder has the lease.
    pub async fn try_acquire(&self, key: &ConversationKey) -> Result<Option<Lease>, ColloquyError> {
        let lock_key = self.lock_key(key);
        let token = new_id();
        if self
            .store
            .set_if_absent(&lock_key, &token, self.lease_ttl)
            .await?
        {
            debug!(conversation = %key, "lease acquired");
            Ok(Some(Lease {
                store: self.store.clone(),
                lock_key,
                token,
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Poll [`try_acquire`](Self::try_acquire) until it succeeds or the
    /// admission deadline passes, which yields [`ColloquyError::Busy`].
    pub async fn acquire(&self, key: &ConversationKey) -> Result<Lease, ColloquyError> {
        let started = Instant::now();
        let deadline = started + self.wait;
        loop {
            if let Some(lease) = self.try_acquire(key).await? {
                return Ok(lease);
            }
            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                info!(conversation = %key, ?waited, "conversation busy, admission refused");
                return Err(ColloquyError::Busy {
                    key: key.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Release by token. A stale or foreign token is a no-op returning `false`.
    pub async fn release_token(
        &self,
        key: &ConversationKey,
        token: &str,
    ) -> Result<bool, ColloquyError> {
        self.store
            .compare_and_delete(&self.lock_key(key), token)
            .await
    }
}

/// A held lease.
///
/// Dropping a lease that was not released spawns its release on the current
/// runtime, so a cancelled request does not hold the conversation until the TTL.
pub struct Lease {
    store: Arc<dyn StorageAdapter>,
    lock_key: String,
    token: String,
    released: bool,
}

impl Lease {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lease. Returns `false` if it had already expired and was
    /// taken by someone else.
    ///
    /// On a store error the lease stays armed, so dropping it retries the
    /// release in the background.
    pub async fn release(mut self) -> Result<bool, ColloquyError> {
        let released = self
            .store
            .compare_and_delete(&self.lock_key, &self.token)
            .await?;
        self.released = true;
        if !released {
            warn!(lock_key = %self.lock_key, "lease expired before release");
        }
        Ok(released)
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("lock_key", &self.lock_key)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let lock_key = std::mem::take(&mut self.lock_key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            match store.compare_and_delete(&lock_key, &token).await {
                Ok(_) => debug!(%lock_key, "abandoned lease released"),
                Err(e) => warn!(%lock_key, error = %e, "failed to release abandoned lease"),
            }
        });
    }
}
