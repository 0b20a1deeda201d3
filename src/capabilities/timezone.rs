//! Time-zone capability client.
//!
//! Looks up the local time and UTC offset for a place name already stripped
//! of command phrasing.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EndpointConfig;
use crate::error::{Result, TernError};

use super::{Capability, CapabilityRequest, CapabilityResult};

#[derive(Debug, Deserialize)]
struct TimezoneResponse {
    #[serde(default)]
    local_time: Option<String>,
    #[serde(default)]
    utc_offset: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the time-zone endpoint.
pub struct TimezoneClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
}

impl TimezoneClient {
    /// Create a client against the configured endpoint.
    pub fn new(http: reqwest::Client, endpoint: EndpointConfig) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl Capability for TimezoneClient {
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
        let place = match &request {
            CapabilityRequest::Timezone { place } => place,
            other => {
                return Err(TernError::Capability(format!(
                    "timezone client received {} request",
                    other.name()
                ))
                .into())
            }
        };

        let url = format!("{}/timezone", self.endpoint.base_url.trim_end_matches('/'));
        let mut http_request = self.http.get(&url).query(&[("place", place.as_str())]);
        if let Some(key) = &self.endpoint.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "timezone endpoint returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: TimezoneResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(TernError::Capability(error).into());
        }

        let (local_time, utc_offset) = match (parsed.local_time, parsed.utc_offset) {
            (Some(local_time), Some(utc_offset)) => (local_time, utc_offset),
            _ => {
                return Err(TernError::Capability(
                    "timezone response was missing local time or offset".to_string(),
                )
                .into())
            }
        };

        let mut fields = serde_json::json!({
            "place": place,
            "local_time": local_time,
            "utc_offset": utc_offset,
        });
        if let Some(timezone) = parsed.timezone {
            fields["timezone"] = serde_json::Value::String(timezone);
        }

        Ok(CapabilityResult::StructuredRecord {
            kind: "timezone".to_string(),
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_full() {
        let json = r#"{
            "local_time": "2025-03-01T14:02:00",
            "utc_offset": "+09:00",
            "timezone": "Asia/Tokyo"
        }"#;
        let parsed: TimezoneResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.utc_offset.as_deref(), Some("+09:00"));
        assert_eq!(parsed.timezone.as_deref(), Some("Asia/Tokyo"));
    }

    #[test]
    fn test_response_with_error_field() {
        let parsed: TimezoneResponse =
            serde_json::from_str(r#"{"error": "unknown place"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("unknown place"));
    }
}
