//! Air quality capability client.
//!
//! Queries the endpoint by coordinates and normalizes the AQI and pollen
//! readings into a structured record.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{Capability, CapabilityRequest, CapabilityResult};

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    #[serde(default)]
    aqi: Option<i64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    pollen: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the air quality endpoint.
pub struct AirQualityClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl AirQualityClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for AirQualityClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        let coords = match &request {
            CapabilityRequest::AirQuality { coords } => *coords,
            other => {
                return Err(TernError::Capability(format!(
                    "air quality client received {} request",
                    other.name()
                ))
                .into())
            }
        };

        let url = format!(
            "{}/air-quality",
            self.endpoint.base_url.trim_end_matches('/')
        );
        let mut http_request = self
            .http
            .get(&url)
            .query(&[("lat", coords.lat), ("lon", coords.lon)]);
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "air quality endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: AirQualityResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        let aqi = parsed.aqi.ok_or_else(|| {
            TernError::Capability("air quality response had no AQI".to_string())
        })?;

        let mut fields = serde_json::json!({ "aqi": aqi });
        if let Some(category) = parsed.category {
            fields["category"] = serde_json::Value::String(category);
        }
        if let Some(pollen) = parsed.pollen {
            fields["pollen"] = pollen;
        }

        Ok(CapabilityResult::StructuredRecord {
            kind: "air_quality".to_string(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_pollen() {
        let json = r#"{
            "aqi": 42,
            "category": "Good",
            "pollen": {"tree": "low", "grass": "moderate"}
        }"#;
        let parsed: AirQualityResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.aqi, Some(42));
        assert_eq!(parsed.category.as_deref(), Some("Good"));
        assert!(parsed.pollen.is_some());
    }

    #[test]
    fn test_response_minimal() {
        let parsed: AirQualityResponse = serde_json::from_str(r#"{"aqi": 155}"#).unwrap();
        assert_eq!(parsed.aqi, Some(155));
        assert!(parsed.category.is_none());
        assert!(parsed.pollen.is_none());
    }

    #[test]
    fn test_response_with_error_field() {
        let parsed: AirQualityResponse =
            serde_json::from_str(r#"{"error": "coverage unavailable"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("coverage unavailable"));
    }
}
