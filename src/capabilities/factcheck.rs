//! Fact verification capability client.
//!
//! Forwards the claim verbatim (after marker stripping in the classifier)
//! and renders the verdict plus explanation as prose.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{Capability, CapabilityRequest, CapabilityResult};

#[derive(Debug, Serialize)]
struct VerifyBody<'a> {
    claim: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the fact verification endpoint.
pub struct FactCheckClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl FactCheckClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for FactCheckClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        let claim = match &request {
            CapabilityRequest::FactCheck { claim } => claim,
            other => {
                return Err(TernError::Capability(format!(
                    "fact check client received {} request",
                    other.name()
                ))
                .into())
            }
        };

        let url = format!("{}/verify", self.endpoint.base_url.trim_end_matches('/'));
        let mut http_request = self.http.post(&url).json(&VerifyBody { claim });
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "fact check endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: VerifyResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        let text = match (parsed.verdict, parsed.explanation) {
            (Some(verdict), Some(explanation)) => format!("{}: {}", verdict, explanation),
            (Some(verdict), None) => verdict,
            (None, Some(explanation)) => explanation,
            (None, None) => {
                return Err(
                    TernError::Capability("fact check response had no verdict".to_string()).into(),
                )
            }
        };

        Ok(CapabilityResult::prose(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_forwarded_verbatim() {
        let body = VerifyBody {
            claim: "the earth is flat",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"claim":"the earth is flat"}"#);
    }

    #[test]
    fn test_response_with_verdict_and_explanation() {
        let json = r#"{"verdict": "False", "explanation": "The earth is an oblate spheroid."}"#;
        let parsed: VerifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.verdict.as_deref(), Some("False"));
        assert!(parsed.explanation.unwrap().contains("spheroid"));
    }

    #[test]
    fn test_response_with_error_field() {
        let json = r#"{"error": "claim too long"}"#;
        let parsed: VerifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("claim too long"));
    }
}
