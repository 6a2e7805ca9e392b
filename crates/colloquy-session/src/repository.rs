// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript repository: one TTL-bounded list of serialized messages per conversation.
//!
//! Each message is stored as its own JSON record so mutations can be
//! expressed as list operations (push, insert, trim) rather than
//! rewriting the whole transcript.

use std::sync::Arc;
use std::time::Duration;

use colloquy_config::model::SessionConfig;
use colloquy_core::{
    ColloquyError, ConversationKey, ListOp, Message, Revision, StorageAdapter,
};
use tracing::debug;

use crate::retention::RetentionPolicy;

/// A transcript together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub messages: Vec<Message>,
    pub revision: Revision,
}

/// A planned batch of list operations and the value to hand back once it commits.
#[derive(Debug)]
pub struct Mutation<T> {
    pub ops: Vec<ListOp>,
    pub output: T,
}

impl<T> Mutation<T> {
    /// A mutation that leaves the store untouched.
    pub fn noop(output: T) -> Self {
        Self {
            ops: Vec::new(),
            output,
        }
    }
}

#[derive(Clone)]
pub struct TranscriptRepository {
    store: Arc<dyn StorageAdapter>,
    key_prefix: String,
    ttl: Duration,
    policy: RetentionPolicy,
}

impl TranscriptRepository {
    pub fn new(
        store: Arc<dyn StorageAdapter>,
        key_prefix: impl Into<String>,
        ttl: Duration,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            ttl,
            policy,
        }
    }

    pub fn from_config(
        store: Arc<dyn StorageAdapter>,
        config: &SessionConfig,
        policy: RetentionPolicy,
    ) -> Self {
        Self::new(store, config.key_prefix.clone(), config.ttl(), policy)
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Store key of a conversation.
    pub fn storage_key(&self, key: &ConversationKey) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Ordered transcript of `key`; empty when the conversation does not exist.
    pub async fn load(&self, key: &ConversationKey) -> Result<Vec<Message>, ColloquyError> {
        Ok(self.snapshot(key).await?.messages)
    }

    /// Transcript plus the revision to guard a later commit with.
    pub async fn snapshot(&self, key: &ConversationKey) -> Result<Snapshot, ColloquyError> {
        let read = self.store.read_list(&self.storage_key(key)).await?;
        let messages = read
            .value
            .iter()
            .map(|record| serde_json::from_str::<Message>(record))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Snapshot {
            messages,
            revision: read.revision,
        })
    }

    /// Replace the stored transcript wholesale. Debug and maintenance path only:
    /// it ignores concurrent writers.
    pub async fn save(
        &self,
        key: &ConversationKey,
        messages: &[Message],
    ) -> Result<Revision, ColloquyError> {
        let ops = if messages.is_empty() {
            vec![ListOp::Delete]
        } else {
            vec![ListOp::Replace(encode_all(messages)?)]
        };
        self.commit(key, ops, None).await
    }

    /// Apply `ops` atomically, refreshing the sliding TTL unless the batch
    /// deletes the conversation. With a guard, fails with
    /// [`ColloquyError::Conflict`] if the conversation changed since that revision.
    pub async fn commit(
        &self,
        key: &ConversationKey,
        mut ops: Vec<ListOp>,
        guard: Option<Revision>,
    ) -> Result<Revision, ColloquyError> {
        if !matches!(ops.last(), Some(ListOp::Delete)) {
            ops.push(ListOp::Expire(self.ttl));
        }
        let revision = self.store.apply(&self.storage_key(key), ops, guard).await?;
        debug!(conversation = %key, %revision, "transcript committed");
        Ok(revision)
    }

    /// Trim the stored list so it matches retention of `full`, the whole
    /// transcript as stored after the latest mutation.
    pub async fn apply_retention(
        &self,
        key: &ConversationKey,
        full: &[Message],
    ) -> Result<Revision, ColloquyError> {
        let ops = self.retention_ops(full)?;
        self.commit(key, ops, None).await
    }

    /// List operations that bring a stored `full` transcript within budget.
    ///
    /// Trims from the retention boundary and re-pushes the system message the
    /// trim displaced. Deletes the key when nothing would remain.
    pub fn retention_ops(&self, full: &[Message]) -> Result<Vec<ListOp>, ColloquyError> {
        let plan = self.policy.plan(full);
        if plan.is_noop() {
            return Ok(Vec::new());
        }
        if plan.retained_len(full.len()) == 0 {
            return Ok(vec![ListOp::Delete]);
        }
        let mut ops = vec![ListOp::TrimFrom(plan.keep_from)];
        if plan.keep_system {
            ops.push(ListOp::PushFront(encode(&full[0])?));
        }
        Ok(ops)
    }

    /// Read, plan and commit once, guarded by the revision read.
    ///
    /// A plan with no operations commits nothing.
    pub async fn mutate_once<T, P>(
        &self,
        key: &ConversationKey,
        plan: &mut P,
    ) -> Result<T, ColloquyError>
    where
        P: FnMut(&Snapshot) -> Result<Mutation<T>, ColloquyError>,
    {
        let snapshot = self.snapshot(key).await?;
        let Mutation { ops, output } = plan(&snapshot)?;
        if !ops.is_empty() {
            self.commit(key, ops, Some(snapshot.revision)).await?;
        }
        Ok(output)
    }
}

pub(crate) fn encode(message: &Message) -> Result<String, ColloquyError> {
    Ok(serde_json::to_string(message)?)
}

pub(crate) fn encode_all(messages: &[Message]) -> Result<Vec<String>, ColloquyError> {
    messages.iter().map(encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::Role;
    use colloquy_storage::MemoryStore;

    fn repository(policy: RetentionPolicy) -> TranscriptRepository {
        TranscriptRepository::new(
            Arc::new(MemoryStore::new()),
            "chat_session:",
            Duration::from_secs(60),
            policy,
        )
    }

    #[tokio::test]
    async fn load_of_absent_conversation_is_empty() {
        let repo = repository(RetentionPolicy::default());
        let key = ConversationKey::new("nobody");
        assert!(repo.load(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip_preserves_order() {
        let repo = repository(RetentionPolicy::default());
        let key = ConversationKey::new("c1");
        let messages = vec![Message::system("s"), Message::user("hi")];
        repo.save(&key, &messages).await.unwrap();
        assert_eq!(repo.load(&key).await.unwrap(), messages);

        repo.save(&key, &[]).await.unwrap();
        assert!(repo.load(&key).await.unwrap().is_empty());
    }

    #[test]
    fn storage_key_uses_prefix() {
        let repo = repository(RetentionPolicy::default());
        assert_eq!(
            repo.storage_key(&ConversationKey::new("abc")),
            "chat_session:abc"
        );
    }

    #[test]
    fn retention_ops_are_empty_within_budget() {
        let repo = repository(RetentionPolicy::default());
        let full = vec![Message::system("s"), Message::user("hi")];
        assert!(repo.retention_ops(&full).unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_retention_trims_tail_and_restores_system() {
        let repo = repository(RetentionPolicy::new(1, 24_000));
        let key = ConversationKey::new("c1");
        let full = vec![
            Message::system("s"),
            Message::user("old"),
            Message::user("new"),
        ];
        repo.save(&key, &full).await.unwrap();
        repo.apply_retention(&key, &full).await.unwrap();

        let stored = repo.load(&key).await.unwrap();
        let contents: Vec<_> = stored.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["s", "new"]);
        assert_eq!(stored[0].role, Role::System);
    }

    #[tokio::test]
    async fn apply_retention_deletes_when_nothing_remains() {
        let repo = repository(RetentionPolicy::new(10, 2));
        let key = ConversationKey::new("c1");
        let full = vec![Message::user("too long to keep")];
        repo.save(&key, &full).await.unwrap();
        repo.apply_retention(&key, &full).await.unwrap();
        assert!(repo.load(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutate_once_conflicts_when_store_moves_underneath() {
        let repo = repository(RetentionPolicy::default());
        let key = ConversationKey::new("c1");
        let other = repo.clone();
        let other_key = key.clone();

        let mut plan = |_: &Snapshot| -> Result<Mutation<()>, ColloquyError> {
            Ok(Mutation {
                ops: vec![ListOp::Push(vec![encode(&Message::user("mine"))?])],
                output: (),
            })
        };

        // Simulate an interleaved writer between read and commit.
        let snapshot = repo.snapshot(&key).await.unwrap();
        other
            .save(&other_key, &[Message::user("theirs")])
            .await
            .unwrap();
        let Mutation { ops, .. } = plan(&snapshot).unwrap();
        let err = repo
            .commit(&key, ops, Some(snapshot.revision))
            .await
            .unwrap_err();
        assert!(matches!(err, ColloquyError::Conflict { .. }));

        // A fresh attempt succeeds.
        repo.mutate_once(&key, &mut plan).await.unwrap();
        assert_eq!(repo.load(&key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn corrupt_record_surfaces_as_serialization_error() {
        let store = Arc::new(MemoryStore::new());
        store
            .apply(
                "chat_session:bad",
                vec![ListOp::Push(vec!["not json".into()])],
                None,
            )
            .await
            .unwrap();
        let repo = TranscriptRepository::new(
            store,
            "chat_session:",
            Duration::from_secs(60),
            RetentionPolicy::default(),
        );
        let err = repo.load(&ConversationKey::new("bad")).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Serialization(_)));
        assert!(!err.is_transient());
    }
}
