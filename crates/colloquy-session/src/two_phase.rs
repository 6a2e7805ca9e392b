// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Two-phase append.
//!
//! Phase 1 durably records the user's message and returns the retained
//! transcript to send for inference. The caller runs inference with no
//! lease held and no watch open. Phase 2 splices the reply in right after
//! the user message it answers. Phase 2 is idempotent per user message id.

use colloquy_core::{ColloquyError, ConversationKey, ListOp, Message};
use tracing::{debug, warn};

use crate::guard::MutationGuard;
use crate::repository::{Mutation, Snapshot, TranscriptRepository, encode, encode_all};

/// Result of Phase 1.
#[derive(Debug, Clone)]
pub struct AppendedUser {
    /// Post-retention transcript ending with the new user message.
    pub transcript: Vec<Message>,
    pub user_message_id: String,
}

/// Result of Phase 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The reply was spliced in.
    Inserted,
    /// A reply to this user message was already stored; nothing changed.
    AlreadyApplied,
    /// The user message was evicted by retention first; the reply was not stored.
    Pruned,
}

impl InsertOutcome {
    /// Whether a reply to the user message is now stored.
    pub fn is_persisted(self) -> bool {
        !matches!(self, Self::Pruned)
    }
}

#[derive(Clone)]
pub struct TwoPhaseAppend {
    repo: TranscriptRepository,
    guard: MutationGuard,
    system_prompt: String,
}

impl TwoPhaseAppend {
    pub fn new(
        repo: TranscriptRepository,
        guard: MutationGuard,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            guard,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn repository(&self) -> &TranscriptRepository {
        &self.repo
    }

    /// Phase 1: append a user message carrying a fresh id.
    ///
    /// A new conversation gets the system message first. Performs no
    /// inference.
    pub async fn append_user(
        &self,
        key: &ConversationKey,
        content: &str,
    ) -> Result<AppendedUser, ColloquyError> {
        let appended = self
            .guard
            .mutate(key, |snapshot| {
                plan_append_user(
                    snapshot,
                    &self.repo,
                    &self.system_prompt,
                    Message::user(content),
                )
            })
            .await?;
        debug!(
            conversation = %key,
            user_message_id = %appended.user_message_id,
            messages = appended.transcript.len(),
            "user message appended"
        );
        Ok(appended)
    }

    /// Phase 2: store `content` as the reply to `user_message_id`.
    pub async fn insert_assistant(
        &self,
        key: &ConversationKey,
        user_message_id: &str,
        content: &str,
    ) -> Result<InsertOutcome, ColloquyError> {
        let outcome = self
            .guard
            .mutate(key, |snapshot| {
                plan_insert_assistant(snapshot, &self.repo, user_message_id, content)
            })
            .await?;
        match outcome {
            InsertOutcome::Inserted => {
                debug!(conversation = %key, user_message_id, "assistant reply inserted");
            }
            InsertOutcome::AlreadyApplied => {
                debug!(conversation = %key, user_message_id, "assistant reply already stored");
            }
            InsertOutcome::Pruned => {
                warn!(
                    conversation = %key,
                    user_message_id,
                    "user message pruned before reply insert, reply not persisted"
                );
            }
        }
        Ok(outcome)
    }
}

fn plan_append_user(
    snapshot: &Snapshot,
    repo: &TranscriptRepository,
    system_prompt: &str,
    user: Message,
) -> Result<Mutation<AppendedUser>, ColloquyError> {
    let user_message_id = user.id.clone().unwrap_or_default();

    let mut pushed = Vec::with_capacity(2);
    if snapshot.messages.is_empty() {
        pushed.push(Message::system(system_prompt));
    }
    pushed.push(user);

    let mut full = snapshot.messages.clone();
    full.extend(pushed.iter().cloned());

    let mut ops = vec![ListOp::Push(encode_all(&pushed)?)];
    ops.extend(repo.retention_ops(&full)?);

    Ok(Mutation {
        ops,
        output: AppendedUser {
            transcript: repo.policy().apply(&full),
            user_message_id,
        },
    })
}

fn plan_insert_assistant(
    snapshot: &Snapshot,
    repo: &TranscriptRepository,
    user_message_id: &str,
    content: &str,
) -> Result<Mutation<InsertOutcome>, ColloquyError> {
    let messages = &snapshot.messages;
    let Some(user_index) = messages
        .iter()
        .position(|m| m.is_user_with_id(user_message_id))
    else {
        return Ok(Mutation::noop(InsertOutcome::Pruned));
    };
    if messages.iter().any(|m| m.answers(user_message_id)) {
        return Ok(Mutation::noop(InsertOutcome::AlreadyApplied));
    }

    let reply = Message::assistant_reply(user_message_id, content);
    let index = user_index + 1;
    let mut full = messages.clone();
    full.insert(index, reply.clone());

    let mut ops = vec![ListOp::Insert {
        index,
        value: encode(&reply)?,
    }];
    ops.extend(repo.retention_ops(&full)?);

    Ok(Mutation {
        ops,
        output: InsertOutcome::Inserted,
    })
}
