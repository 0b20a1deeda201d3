//! Directions capability client.
//!
//! The origin is either acquired coordinates or the "current location"
//! sentinel; the destination arrives already stripped of command phrasing.
//! Normalizes distance, duration, and steps into a structured record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{Capability, CapabilityRequest, CapabilityResult, DirectionsOrigin};

#[derive(Debug, Serialize)]
struct DirectionsBody<'a> {
    origin: &'a DirectionsOrigin,
    destination: &'a str,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    distance: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the directions endpoint.
pub struct DirectionsClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl DirectionsClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for DirectionsClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        let (origin, destination) = match &request {
            CapabilityRequest::Directions {
                origin,
                destination,
            } => (origin, destination),
            other => {
                return Err(TernError::Capability(format!(
                    "directions client received {} request",
                    other.name()
                ))
                .into())
            }
        };

        let url = format!(
            "{}/directions",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let mut http_request = self.http.post(&url).json(&DirectionsBody {
            origin,
            destination,
        });
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "directions endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: DirectionsResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        let (distance, duration) = match (parsed.distance, parsed.duration) {
            (Some(distance), Some(duration)) => (distance, duration),
            _ => {
                return Err(TernError::Capability(
                    "directions response was missing distance or duration".to_string(),
                )
                .into())
            }
        };

        Ok(CapabilityResult::StructuredRecord {
            kind: "directions".to_string(),
            fields: serde_json::json!({
                "destination": destination,
                "distance": distance,
                "duration": duration,
                "steps": parsed.steps,
            }),
        })
    }
}
