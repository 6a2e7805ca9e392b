// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ask flow: validate, record the question, infer, splice the answer back.

use std::sync::Arc;

use colloquy_config::model::{ColloquyConfig, Strategy};
use colloquy_core::{ColloquyError, ConversationKey, Message, ProviderAdapter, StorageAdapter};
use tracing::{debug, info, warn};

use crate::guard::MutationGuard;
use crate::lock::LockManager;
use crate::optimistic::OptimisticController;
use crate::repository::TranscriptRepository;
use crate::retention::RetentionPolicy;
use crate::two_phase::TwoPhaseAppend;

/// Answer to one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskReply {
    pub conversation_key: ConversationKey,
    pub answer: String,
    /// Whether the answer was stored in the transcript. `false` means the
    /// question was pruned before the answer arrived, or every store attempt
    /// failed; the answer is still returned.
    pub persisted: bool,
}

#[derive(Clone)]
pub struct ConversationService {
    two_phase: TwoPhaseAppend,
    provider: Arc<dyn ProviderAdapter>,
    insert_retries: u32,
}

impl ConversationService {
    pub fn new(
        two_phase: TwoPhaseAppend,
        provider: Arc<dyn ProviderAdapter>,
        insert_retries: u32,
    ) -> Self {
        Self {
            two_phase,
            provider,
            insert_retries: insert_retries.max(1),
        }
    }

    /// Wire repository, guard strategy and two-phase append from configuration.
    pub fn from_config(
        store: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        config: &ColloquyConfig,
    ) -> Self {
        let repo = TranscriptRepository::from_config(
            store.clone(),
            &config.session,
            RetentionPolicy::from(&config.retention),
        );
        let guard = match config.session.strategy {
            Strategy::Pessimistic => {
                MutationGuard::pessimistic(LockManager::new(store, &config.lock), repo.clone())
            }
            Strategy::Optimistic => MutationGuard::optimistic(OptimisticController::new(
                repo.clone(),
                config.session.conflict_retries,
            )),
        };
        info!(strategy = guard.strategy_name(), "conversation service configured");
        let two_phase = TwoPhaseAppend::new(repo, guard, config.session.system_prompt.clone());
        Self::new(two_phase, provider, config.session.insert_retries)
    }

    pub fn repository(&self) -> &TranscriptRepository {
        self.two_phase.repository()
    }

    /// Stored transcript of a conversation, for inspection.
    pub async fn transcript(&self, conversation_id: &str) -> Result<Vec<Message>, ColloquyError> {
        let repo = self.repository();
        let key = ConversationKey::normalize(Some(conversation_id), repo.key_prefix());
        repo.load(&key).await
    }

    /// Answer `question` within the conversation `conversation_id`, starting a
    /// new conversation when it is absent or blank.
    pub async fn ask(
        &self,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<AskReply, ColloquyError> {
        if question.trim().is_empty() {
            return Err(ColloquyError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        let key = ConversationKey::normalize(conversation_id, self.repository().key_prefix());

        let appended = self.two_phase.append_user(&key, question).await?;

        let answer = match self.provider.complete(&appended.transcript).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(conversation = %key, error = %e, "inference failed, question kept");
                return Err(e);
            }
        };

        let persisted = self
            .insert_with_retry(&key, &appended.user_message_id, &answer)
            .await;
        info!(conversation = %key, persisted, "question answered");

        Ok(AskReply {
            conversation_key: key,
            answer,
            persisted,
        })
    }

    /// Phase 2 with bounded retry on transient failures. Never fails the request.
    async fn insert_with_retry(
        &self,
        key: &ConversationKey,
        user_message_id: &str,
        answer: &str,
    ) -> bool {
        for attempt in 1..=self.insert_retries {
            match self
                .two_phase
                .insert_assistant(key, user_message_id, answer)
                .await
            {
                Ok(outcome) => return outcome.is_persisted(),
                Err(e) if e.is_transient() && attempt < self.insert_retries => {
                    debug!(conversation = %key, attempt, error = %e, "reply insert failed, retrying");
                }
                Err(e) => {
                    warn!(
                        conversation = %key,
                        user_message_id,
                        attempt,
                        error = %e,
                        "reply insert failed, answer not persisted"
                    );
                    return false;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::Role;
    use colloquy_storage::MemoryStore;
    use colloquy_test_utils::MockProvider;
    use tracing_test::traced_test;

    fn config(strategy: Strategy) -> ColloquyConfig {
        let mut config = ColloquyConfig::default();
        config.session.strategy = strategy;
        config.session.system_prompt = "sys".to_string();
        config
    }

    fn service(provider: Arc<MockProvider>, config: &ColloquyConfig) -> ConversationService {
        ConversationService::from_config(Arc::new(MemoryStore::new()), provider, config)
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let svc = service(Arc::new(MockProvider::new()), &config(Strategy::Pessimistic));
        let err = svc.ask(None, "   ").await.unwrap_err();
        assert!(matches!(err, ColloquyError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn ask_generates_key_and_persists_turn() {
        let provider = Arc::new(MockProvider::with_responses(vec!["hello".into()]));
        let svc = service(provider.clone(), &config(Strategy::Pessimistic));

        let reply = svc.ask(None, "hi").await.unwrap();
        assert_eq!(reply.answer, "hello");
        assert!(reply.persisted);
        assert!(!reply.conversation_key.as_str().is_empty());

        let stored = svc.transcript(reply.conversation_key.as_str()).await.unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);

        // The provider saw the Phase 1 snapshot.
        let seen = provider.requests().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2);
    }

    #[tokio::test]
    async fn prefixed_key_continues_same_conversation() {
        let provider = Arc::new(MockProvider::new());
        let svc = service(provider, &config(Strategy::Optimistic));

        svc.ask(Some("abc"), "one").await.unwrap();
        let reply = svc.ask(Some("chat_session:abc"), "two").await.unwrap();
        assert_eq!(reply.conversation_key.as_str(), "abc");
        assert_eq!(svc.transcript("abc").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn provider_failure_keeps_the_question() {
        let provider = Arc::new(MockProvider::failing("upstream down"));
        let svc = service(provider, &config(Strategy::Pessimistic));

        let err = svc.ask(Some("c1"), "hi").await.unwrap_err();
        assert_eq!(err.class(), colloquy_core::ErrorClass::UpstreamUnavailable);

        let stored = svc.transcript("c1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].content, "hi");
    }

    #[tokio::test]
    #[traced_test]
    async fn pruned_question_still_returns_answer() {
        let mut cfg = config(Strategy::Pessimistic);
        cfg.retention.max_chars = 5;
        let provider = Arc::new(MockProvider::with_responses(vec!["an answer".into()]));
        let svc = service(provider, &cfg);

        // The question alone exceeds the budget, so Phase 1 already evicts it.
        let reply = svc.ask(Some("c1"), "a long question").await.unwrap();
        assert_eq!(reply.answer, "an answer");
        assert!(!reply.persisted);
        assert!(logs_contain("reply not persisted"));
    }
}
