//! Conversation title generation.
//!
//! Fired once per conversation after the first assistant reply completes.
//! The trigger runs detached from the turn; a failure here never affects
//! turn completion. [`HttpTitleClient`] reads the opening exchange back from
//! the store and asks the title endpoint to summarize it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};
use crate::store::ConversationStore;

/// Produces a short human-readable conversation title.
#[async_trait]
pub trait TitleGenerator: Send + Sync {
    /// Generate a title from the conversation's opening exchange.
    async fn generate_title(&self, conversation_id: Ulid) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct TitleBody {
    messages: Vec<TitleMessage>,
}

#[derive(Debug, Serialize)]
struct TitleMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct TitleResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the title generation endpoint.
pub struct HttpTitleClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
    store: Arc<dyn ConversationStore>,
}

impl HttpTitleClient {
    /// Create a client against the configured endpoint.
    pub fn new(
        http: reqwest::Client,
        endpoint: EndpointConfig,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            http,
            endpoint,
            store,
        }
    }
}

#[async_trait]
impl TitleGenerator for HttpTitleClient {
    async fn generate_title(&self, conversation_id: Ulid) -> Result<String> {
        let stored = self.store.list_messages(conversation_id).await?;
        // The opening exchange is enough context for a title.
        let messages: Vec<TitleMessage> = stored
            .iter()
            .take(2)
            .filter_map(|m| {
                m.content.as_text().map(|text| TitleMessage {
                    role: m.role.as_str().to_string(),
                    content: text.to_string(),
                })
            })
            .collect();

        if messages.is_empty() {
            return Err(TernError::TitleGeneration(
                "conversation has no text messages to summarize".to_string(),
            )
            .into());
        }

        let url = format!("{}/title", self.endpoint.base_url.trim_end_matches('/'));
        let mut http_request = self.http.post(&url).json(&TitleBody { messages });
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::TitleGeneration(format!(
                "title endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: TitleResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::TitleGeneration(error).into());
        }

        let title = parsed
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                TernError::TitleGeneration("title response was empty".to_string())
            })?;

        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_body_shape() {
        let body = TitleBody {
            messages: vec![
                TitleMessage {
                    role: "user".to_string(),
                    content: "pizza places near me".to_string(),
                },
                TitleMessage {
                    role: "assistant".to_string(),
                    content: "Here are three options".to_string(),
                },
            ],
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("pizza places near me"));
    }

    #[test]
    fn test_title_response_parses() {
        let parsed: TitleResponse =
            serde_json::from_str(r#"{"title": "Pizza nearby"}"#).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Pizza nearby"));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_title_response_with_error() {
        let parsed: TitleResponse =
            serde_json::from_str(r#"{"error": "rate limited"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("rate limited"));
    }
}
