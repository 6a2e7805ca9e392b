// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation session store.
//!
//! Keeps one bounded transcript per conversation in a shared
//! [`StorageAdapter`](colloquy_core::StorageAdapter) and makes concurrent
//! mutation of the same conversation safe:
//!
//! - [`retention`]: turn and character budgets, computed as a trim boundary.
//! - [`repository`]: list-per-conversation storage with sliding TTL.
//! - [`lock`]: per-conversation leases with token-checked release.
//! - [`optimistic`]: guarded read-modify-write with bounded conflict retry.
//! - [`two_phase`]: user append before inference, idempotent reply insert after.
//! - [`service`]: the ask flow tying these to an inference provider.

pub mod guard;
pub mod lock;
pub mod optimistic;
pub mod repository;
pub mod retention;
pub mod service;
pub mod two_phase;

pub use guard::MutationGuard;
pub use lock::{Lease, LockManager};
pub use optimistic::OptimisticController;
pub use repository::{Mutation, Snapshot, TranscriptRepository};
pub use retention::{RetentionPlan, RetentionPolicy};
pub use service::{AskReply, ConversationService};
pub use two_phase::{AppendedUser, InsertOutcome, TwoPhaseAppend};
