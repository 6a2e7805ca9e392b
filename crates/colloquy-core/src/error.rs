// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Colloquy conversation store.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Colloquy adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ColloquyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store errors (connection failure, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Inference provider errors (API failure, network failure, empty completion).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored record could not be encoded or decoded. Retrying reads the same bytes.
    #[error("corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request was malformed before any store interaction.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The conversation lease could not be acquired before the admission deadline.
    #[error("conversation {key} is busy, try again (waited {waited:?})")]
    Busy { key: String, waited: Duration },

    /// A guarded commit lost the race: the watched key changed since it was read.
    #[error("conversation {key} was modified concurrently")]
    Conflict { key: String },

    /// Every allowed optimistic attempt ended in a conflict.
    #[error("conversation {key} update conflicted {attempts} times, giving up")]
    ConflictExhausted { key: String, attempts: u32 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by front ends to pick a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    BadInput,
    Busy,
    UpstreamUnavailable,
    ConflictExhausted,
    Internal,
}

impl ColloquyError {
    /// Wrap any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Classify the error for the front-end collaborator.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) => ErrorClass::BadInput,
            Self::Busy { .. } => ErrorClass::Busy,
            Self::Storage { .. } | Self::Provider { .. } | Self::Timeout { .. } => {
                ErrorClass::UpstreamUnavailable
            }
            // A bare conflict only escapes when the caller opted out of retries.
            Self::Conflict { .. } | Self::ConflictExhausted { .. } => {
                ErrorClass::ConflictExhausted
            }
            Self::Config(_) | Self::Serialization(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Whether retrying the same store operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Conflict { .. } | Self::Busy { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_front_end_contract() {
        assert_eq!(
            ColloquyError::InvalidInput("empty".into()).class(),
            ErrorClass::BadInput
        );
        assert_eq!(
            ColloquyError::Busy {
                key: "c1".into(),
                waited: Duration::from_secs(8)
            }
            .class(),
            ErrorClass::Busy
        );
        assert_eq!(
            ColloquyError::storage(std::io::Error::other("down")).class(),
            ErrorClass::UpstreamUnavailable
        );
        assert_eq!(
            ColloquyError::Provider {
                message: "500".into(),
                source: None
            }
            .class(),
            ErrorClass::UpstreamUnavailable
        );
        assert_eq!(
            ColloquyError::ConflictExhausted {
                key: "c1".into(),
                attempts: 3
            }
            .class(),
            ErrorClass::ConflictExhausted
        );
        assert_eq!(
            ColloquyError::Internal("bug".into()).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn only_store_side_failures_are_transient() {
        assert!(ColloquyError::Conflict { key: "c".into() }.is_transient());
        assert!(ColloquyError::storage(std::io::Error::other("reset")).is_transient());
        assert!(!ColloquyError::InvalidInput("x".into()).is_transient());
        assert!(
            !ColloquyError::ConflictExhausted {
                key: "c".into(),
                attempts: 3
            }
            .is_transient()
        );
    }

    #[test]
    fn corrupt_record_is_internal_and_not_retried() {
        let err: ColloquyError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, ColloquyError::Serialization(_)));
        assert_eq!(err.class(), ErrorClass::Internal);
        assert!(!err.is_transient());
    }

    #[test]
    fn busy_message_mentions_key() {
        let err = ColloquyError::Busy {
            key: "abc".into(),
            waited: Duration::from_millis(80),
        };
        assert!(err.to_string().contains("abc"));
        assert_eq!(ErrorClass::Busy.to_string(), "busy");
    }
}
