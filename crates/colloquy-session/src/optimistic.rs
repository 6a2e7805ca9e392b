// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic read-modify-write with bounded conflict retry.

use colloquy_core::{ColloquyError, ConversationKey, ListOp, Message};
use tracing::debug;

use crate::repository::{Mutation, Snapshot, TranscriptRepository, encode_all};

#[derive(Clone)]
pub struct OptimisticController {
    repo: TranscriptRepository,
    max_attempts: u32,
}

impl OptimisticController {
    pub fn new(repo: TranscriptRepository, max_attempts: u32) -> Self {
        Self {
            repo,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// One watch/transform/commit attempt.
    ///
    /// `transform` maps the current transcript to the next one. Fails with
    /// [`ColloquyError::Conflict`] if the conversation changed in between.
    pub async fn update_once<F>(
        &self,
        key: &ConversationKey,
        mut transform: F,
    ) -> Result<Vec<Message>, ColloquyError>
    where
        F: FnMut(&[Message]) -> Result<Vec<Message>, ColloquyError>,
    {
        self.repo
            .mutate_once(key, &mut |snapshot: &Snapshot| {
                transcript_mutation(&snapshot.messages, transform(&snapshot.messages)?)
            })
            .await
    }

    /// [`update_once`](Self::update_once) retried against a fresh read on
    /// every conflict, up to the attempt budget.
    pub async fn update<F>(
        &self,
        key: &ConversationKey,
        mut transform: F,
    ) -> Result<Vec<Message>, ColloquyError>
    where
        F: FnMut(&[Message]) -> Result<Vec<Message>, ColloquyError>,
    {
        self.run(key, |snapshot: &Snapshot| {
            transcript_mutation(&snapshot.messages, transform(&snapshot.messages)?)
        })
        .await
    }

    /// Retry a planned mutation on conflict, up to the attempt budget.
    ///
    /// Exhaustion yields [`ColloquyError::ConflictExhausted`].
    pub async fn run<T, P>(&self, key: &ConversationKey, mut plan: P) -> Result<T, ColloquyError>
    where
        P: FnMut(&Snapshot) -> Result<Mutation<T>, ColloquyError>,
    {
        for attempt in 1..=self.max_attempts {
            match self.repo.mutate_once(key, &mut plan).await {
                Err(ColloquyError::Conflict { .. }) => {
                    debug!(conversation = %key, attempt, "optimistic commit conflicted");
                }
                other => return other,
            }
        }
        Err(ColloquyError::ConflictExhausted {
            key: key.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Cheapest list operations turning `current` into `next`.
fn transcript_mutation(
    current: &[Message],
    next: Vec<Message>,
) -> Result<Mutation<Vec<Message>>, ColloquyError> {
    let ops = if next.as_slice() == current {
        Vec::new()
    } else if next.is_empty() {
        vec![ListOp::Delete]
    } else if next.starts_with(current) {
        vec![ListOp::Push(encode_all(&next[current.len()..])?)]
    } else {
        vec![ListOp::Replace(encode_all(&next)?)]
    };
    Ok(Mutation { ops, output: next })
}
