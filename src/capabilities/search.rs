//! Web search capability client.
//!
//! Sends the query (and device coordinates when available, to bias ranking)
//! to the search endpoint and normalizes the answer into prose with
//! citations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};
use crate::geo::GeoCoordinate;

use super::{Capability, CapabilityRequest, CapabilityResult, Citation};

#[derive(Debug, Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the web search endpoint.
pub struct WebSearchClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl WebSearchClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }

    async fn search(
        &self,
        query: &str,
        coords: Option<GeoCoordinate>,
    ) -> Result<CapabilityResult> {
        let url = format!("{}/search", self.endpoint.base_url.trim_end_matches('/'));
        let body = SearchRequestBody {
            query,
            lat: coords.map(|c| c.lat),
            lon: coords.map(|c| c.lon),
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "search endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: SearchResponseBody = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        let text = parsed
            .answer
            .ok_or_else(|| TernError::Capability("search response had no answer".to_string()))?;

        Ok(CapabilityResult::Prose {
            text,
            citations: parsed.citations,
        })
    }
}

#[async_trait]
impl Capability for WebSearchClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        match request {
            CapabilityRequest::WebSearch { query, coords } => self.search(&query, coords).await,
            other => Err(TernError::Capability(format!(
                "web search client received {} request",
                other.name()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_omits_missing_coords() {
        let body = SearchRequestBody {
            query: "rust news",
            lat: None,
            lon: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"query":"rust news"}"#);
    }

    #[test]
    fn test_request_body_includes_coords() {
        let body = SearchRequestBody {
            query: "coffee",
            lat: Some(42.0),
            lon: Some(-71.0),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"lat\":42.0"));
        assert!(json.contains("\"lon\":-71.0"));
    }

    #[test]
    fn test_response_body_with_citations() {
        let json = r#"{
            "answer": "Rust 1.80 was released.",
            "citations": [{"title": "Rust Blog", "url": "https://blog.rust-lang.org"}]
        }"#;
        let parsed: SearchResponseBody = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("Rust 1.80 was released."));
        assert_eq!(parsed.citations.len(), 1);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn test_response_body_with_error_field() {
        let json = r#"{"error": "quota exhausted"}"#;
        let parsed: SearchResponseBody = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("quota exhausted"));
    }
}
