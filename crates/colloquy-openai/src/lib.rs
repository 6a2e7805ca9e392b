// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible inference provider for Colloquy.
//!
//! Implements [`ProviderAdapter`] over the chat completions API: the ordered
//! transcript goes out, the first choice's text comes back.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use colloquy_config::model::OpenAiConfig;
use colloquy_core::types::{AdapterType, HealthStatus};
use colloquy_core::{ColloquyError, Message, PluginAdapter, ProviderAdapter};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

/// Environment variable consulted when the config carries no key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Chat completions provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `OPENAI_API_KEY` env var -> error.
pub struct OpenAiProvider {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ColloquyError> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            std::env::var(API_KEY_ENV).ok(),
        )?;
        let client = OpenAiClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(
            model = config.model,
            base_url = client.base_url(),
            "OpenAI provider initialized"
        );
        Ok(Self::with_client(client, config.model.clone(), config.temperature))
    }

    /// Creates a provider around an existing client.
    pub fn with_client(client: OpenAiClient, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }

    fn to_request(&self, transcript: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: transcript.iter().map(ChatMessage::from).collect(),
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ColloquyError> {
        // No test request: it would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ColloquyError> {
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, transcript: &[Message]) -> Result<String, ColloquyError> {
        let response = self.client.chat(&self.to_request(transcript)).await?;
        first_choice_text(response)
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, ColloquyError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ColloquyError::Provider {
            message: "completion returned no choices".into(),
            source: None,
        });
    };
    debug!(finish_reason = ?choice.finish_reason, "completion received");
    Ok(choice.message.content.unwrap_or_default())
}

/// Picks the configured key when non-empty, else the environment's.
fn resolve_api_key(
    config_key: Option<&str>,
    env_key: Option<String>,
) -> Result<String, ColloquyError> {
    if let Some(key) = config_key.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    env_key.filter(|k| !k.is_empty()).ok_or_else(|| {
        ColloquyError::Config(format!(
            "OpenAI API key not found. Set openai.api_key in config or {API_KEY_ENV} environment variable."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{ErrorClass, Role};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        let client = OpenAiClient::new("sk-test", &server.uri(), Duration::from_secs(5)).unwrap();
        OpenAiProvider::with_client(client, "gpt-4o-mini".into(), 0.2)
    }

    #[test]
    fn resolve_api_key_prefers_config() {
        let key = resolve_api_key(Some("sk-config"), Some("sk-env".into())).unwrap();
        assert_eq!(key, "sk-config");
    }

    #[test]
    fn resolve_api_key_empty_config_falls_back_to_env() {
        let key = resolve_api_key(Some(""), Some("sk-env".into())).unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn resolve_api_key_missing_everywhere_is_config_error() {
        let err = resolve_api_key(None, None).unwrap_err();
        assert!(matches!(err, ColloquyError::Config(_)));
        assert!(err.to_string().contains(API_KEY_ENV));
    }

    #[test]
    fn request_carries_model_temperature_and_order() {
        let client =
            OpenAiClient::new("k", "http://localhost:1/v1", Duration::from_secs(1)).unwrap();
        let provider = OpenAiProvider::with_client(client, "m".into(), 0.7);
        let transcript = vec![
            Message::system("sys"),
            Message::user("q"),
            Message::assistant_reply("x", "a"),
        ];
        let request = provider.to_request(&transcript);
        assert_eq!(request.model, "m");
        assert_eq!(request.temperature, 0.7);
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"temperature": 0.2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "first"}},
                    {"message": {"role": "assistant", "content": "second"}}
                ]
            })))
            .mount(&server)
            .await;

        let text = provider(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ColloquyError::Provider { .. }));
        assert_eq!(err.class(), ErrorClass::UpstreamUnavailable);
    }

    #[test]
    fn provider_is_named_openai() {
        let client =
            OpenAiClient::new("k", "http://localhost:1/v1", Duration::from_secs(1)).unwrap();
        let provider = OpenAiProvider::with_client(client, "m".into(), 0.2);
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.adapter_type(), AdapterType::Provider);
    }
}
