// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Colloquy workspace.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role of a transcript entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One element of a conversation transcript.
///
/// `id` is only assigned when later correlation is required (user messages
/// that will receive a reply, and the replies themselves). `parent_id` is
/// only set on assistant messages and names the user message they answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
}

impl Message {
    /// A system message without an id.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: None,
            parent_id: None,
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message carrying a freshly generated id.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Some(new_id()),
            parent_id: None,
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant reply to the user message `parent_id`, with its own fresh id.
    pub fn assistant_reply(parent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Some(new_id()),
            parent_id: Some(parent_id.into()),
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Whether this is the user message with the given id.
    pub fn is_user_with_id(&self, id: &str) -> bool {
        self.role == Role::User && self.id.as_deref() == Some(id)
    }

    /// Whether this is an assistant message answering the given user id.
    pub fn answers(&self, user_id: &str) -> bool {
        self.role == Role::Assistant && self.parent_id.as_deref() == Some(user_id)
    }

    /// Content length in characters, the unit of the retention budget.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Generate an opaque unique identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identifier of a conversation as seen by callers (storage prefix stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Wrap an already-normalised identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh conversation identifier.
    pub fn generate() -> Self {
        Self(new_id())
    }

    /// Normalise a caller-supplied identifier.
    ///
    /// Trims whitespace and strips every leading occurrence of `storage_prefix`
    /// (clients sometimes echo back the raw storage key). Returns a freshly
    /// generated key when nothing remains.
    pub fn normalize(raw: Option<&str>, storage_prefix: &str) -> Self {
        let mut id = raw.unwrap_or_default().trim();
        if !storage_prefix.is_empty() {
            while let Some(rest) = id.strip_prefix(storage_prefix) {
                id = rest;
            }
        }
        let id = id.trim();
        if id.is_empty() {
            Self::generate()
        } else {
            Self(id.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Version stamp of a stored key, observed on read and checked on guarded commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A list value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: Revision,
}

/// A single list mutation. Batches of these are applied atomically by a
/// [`StorageAdapter`](crate::StorageAdapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    /// Append values at the tail.
    Push(Vec<String>),
    /// Prepend one value at the head.
    PushFront(String),
    /// Insert a value so it ends up at `index` (clamped to the list length).
    Insert { index: usize, value: String },
    /// Keep only `[index..]`.
    TrimFrom(usize),
    /// Replace the whole list.
    Replace(Vec<String>),
    /// Remove the key.
    Delete,
    /// Set the key's time-to-live, measured from commit time.
    Expire(Duration),
}

/// Expiry outcome of a batch of [`ListOp`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListEffect {
    /// TTL requested by the last `Expire` op still in force, if any.
    pub ttl: Option<Duration>,
    /// Whether a `Delete` cleared a previously requested TTL.
    pub cleared_ttl: bool,
}

impl ListEffect {
    /// Fold the expiry side of one op into the effect.
    pub fn observe(&mut self, op: &ListOp) {
        match op {
            ListOp::Expire(ttl) => self.ttl = Some(*ttl),
            ListOp::Delete => {
                self.ttl = None;
                self.cleared_ttl = true;
            }
            _ => {}
        }
    }

    /// Expiry after the batch, given the one before it. An emptied list has none.
    pub fn resolve<T>(&self, emptied: bool, previous: Option<T>, deadline: impl FnOnce(Duration) -> T) -> Option<T> {
        match self.ttl {
            _ if emptied => None,
            Some(ttl) => Some(deadline(ttl)),
            None if self.cleared_ttl => None,
            None => previous,
        }
    }
}

/// Apply `ops` in order to `items`.
///
/// A `Delete` drops the items and any TTL requested earlier in the batch.
pub fn apply_list_ops(items: &mut Vec<String>, ops: &[ListOp]) -> ListEffect {
    let mut effect = ListEffect::default();
    for op in ops {
        effect.observe(op);
        match op {
            ListOp::Push(values) => items.extend(values.iter().cloned()),
            ListOp::PushFront(value) => items.insert(0, value.clone()),
            ListOp::Insert { index, value } => {
                let at = (*index).min(items.len());
                items.insert(at, value.clone());
            }
            ListOp::TrimFrom(start) => {
                let start = (*start).min(items.len());
                items.drain(..start);
            }
            ListOp::Replace(values) => *items = values.clone(),
            ListOp::Delete => items.clear(),
            ListOp::Expire(_) => {}
        }
    }
    effect
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Provider,
}
