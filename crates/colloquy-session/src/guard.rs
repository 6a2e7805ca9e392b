// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strategies for serializing mutations of one conversation.

use colloquy_core::{ColloquyError, ConversationKey};
use tracing::warn;

use crate::lock::LockManager;
use crate::optimistic::OptimisticController;
use crate::repository::{Mutation, Snapshot, TranscriptRepository};

/// One "serialize mutation for key K" capability, two implementations.
///
/// Both read a snapshot, plan list operations from it and commit them
/// guarded by the revision read. They differ in how contention is handled:
///
/// - `Pessimistic` waits for the conversation lease first, so the guarded
///   commit only fails if a writer ignored the lease (or it expired).
/// - `Optimistic` does not wait and re-plans on a fresh read after each
///   lost race.
#[derive(Clone)]
pub enum MutationGuard {
    Pessimistic {
        locks: LockManager,
        repo: TranscriptRepository,
    },
    Optimistic(OptimisticController),
}

impl MutationGuard {
    pub fn pessimistic(locks: LockManager, repo: TranscriptRepository) -> Self {
        Self::Pessimistic { locks, repo }
    }

    pub fn optimistic(controller: OptimisticController) -> Self {
        Self::Optimistic(controller)
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            Self::Pessimistic { .. } => "pessimistic",
            Self::Optimistic(_) => "optimistic",
        }
    }

    /// Run `plan` against the current transcript of `key` and commit it.
    pub async fn mutate<T, P>(&self, key: &ConversationKey, mut plan: P) -> Result<T, ColloquyError>
    where
        P: FnMut(&Snapshot) -> Result<Mutation<T>, ColloquyError>,
    {
        match self {
            Self::Pessimistic { locks, repo } => {
                let lease = locks.acquire(key).await?;
                let result = repo.mutate_once(key, &mut plan).await;
                if let Err(e) = lease.release().await {
                    warn!(conversation = %key, error = %e, "failed to release lease");
                }
                result
            }
            Self::Optimistic(controller) => controller.run(key, plan).await,
        }
    }
}
