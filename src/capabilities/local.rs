//! Local business search capability client.
//!
//! Results are always a structured entity list; they are never routed
//! through the prose rendering path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{Business, Capability, CapabilityRequest, CapabilityResult, LocationHint};

#[derive(Debug, Serialize)]
struct BusinessSearchBody<'a> {
    query: &'a str,
    location: &'a LocationHint,
}

#[derive(Debug, Deserialize)]
struct BusinessSearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the local business search endpoint.
pub struct LocalBusinessClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl LocalBusinessClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for LocalBusinessClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        let (query, location) = match &request {
            CapabilityRequest::LocalBusiness { query, location } => (query, location),
            other => {
                return Err(TernError::Capability(format!(
                    "local business client received {} request",
                    other.name()
                ))
                .into())
            }
        };

        let url = format!(
            "{}/businesses/search",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let mut http_request = self
            .http
            .post(&url)
            .json(&BusinessSearchBody { query, location });
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "business search endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: BusinessSearchResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        Ok(CapabilityResult::EntityList {
            businesses: parsed.businesses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_with_coordinates() {
        let location = LocationHint::Coordinates {
            lat: 42.0,
            lon: -71.0,
        };
        let body = BusinessSearchBody {
            query: "pizza places",
            location: &location,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"query\":\"pizza places\""));
        assert!(json.contains("\"type\":\"coordinates\""));
        assert!(json.contains("\"lat\":42.0"));
    }

    #[test]
    fn test_request_body_with_place() {
        let location = LocationHint::Place {
            name: "Boston".to_string(),
        };
        let body = BusinessSearchBody {
            query: "restaurants",
            location: &location,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"type\":\"place\""));
        assert!(json.contains("\"name\":\"Boston\""));
    }

    #[test]
    fn test_response_parses_partial_entities() {
        let json = r#"{
            "businesses": [
                {"name": "Luigi's", "address": "1 Main St", "rating": 4.5, "open_now": true},
                {"name": "Mario's"}
            ]
        }"#;
        let parsed: BusinessSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.businesses.len(), 2);
        assert_eq!(parsed.businesses[0].rating, Some(4.5));
        assert!(parsed.businesses[1].address.is_none());
    }

    #[test]
    fn test_empty_response_is_empty_list() {
        let parsed: BusinessSearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.businesses.is_empty());
        assert!(parsed.error.is_none());
    }
}
