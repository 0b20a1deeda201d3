//! Capability clients and the common result type they normalize into.
//!
//! Each backend capability (chat, web search, local business, fact check,
//! air quality, directions, time zone) has one adapter owning its request
//! contract and response normalization. All adapters share one configured
//! `reqwest::Client` and normalize into [`CapabilityResult`].
//!
//! Every call is single-shot: one request, one response, no automatic retry.

pub mod airquality;
pub mod chat;
pub mod directions;
pub mod factcheck;
pub mod local;
pub mod router;
pub mod search;
pub mod timezone;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::config::CapabilityEndpoints;
use crate::error::Result;
use crate::geo::GeoCoordinate;

pub use router::CapabilityRouter;

/// Incremental text channel produced by the streaming chat capability.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A source citation attached to a prose answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Source title or headline
    pub title: String,
    /// Source URL
    pub url: String,
}

/// One business entity in a local search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_now: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Normalized outcome of a capability call.
///
/// Local-business responses are always `EntityList` and rendered through a
/// structured list view, never through the prose path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityResult {
    /// Prose answer with optional source citations
    Prose {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        citations: Vec<Citation>,
    },
    /// Structured business list
    EntityList { businesses: Vec<Business> },
    /// Structured record (air quality, directions, time zone)
    StructuredRecord {
        kind: String,
        fields: serde_json::Value,
    },
    /// Normalized failure, rendered as one assistant-role message
    Error { message: String },
}

impl CapabilityResult {
    /// Prose constructor without citations.
    pub fn prose(text: impl Into<String>) -> Self {
        CapabilityResult::Prose {
            text: text.into(),
            citations: Vec::new(),
        }
    }

    /// Error constructor.
    pub fn error(message: impl Into<String>) -> Self {
        CapabilityResult::Error {
            message: message.into(),
        }
    }

    /// True for the `Error` variant.
    pub fn is_error(&self) -> bool {
        matches!(self, CapabilityResult::Error { .. })
    }
}

/// Location context for a local-business request: acquired coordinates or an
/// explicit place stated in the utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocationHint {
    Coordinates { lat: f64, lon: f64 },
    Place { name: String },
}

impl From<GeoCoordinate> for LocationHint {
    fn from(coords: GeoCoordinate) -> Self {
        LocationHint::Coordinates {
            lat: coords.lat,
            lon: coords.lon,
        }
    }
}

/// Directions origin: acquired coordinates or the "current location"
/// sentinel understood by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectionsOrigin {
    Coordinates { lat: f64, lon: f64 },
    CurrentLocation,
}

/// One history entry forwarded to the chat capability for context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

/// Request to the streaming chat capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user utterance for this turn
    pub message: String,
    /// Prior committed turns, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

/// Request to a non-streaming capability, one variant per intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum CapabilityRequest {
    WebSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coords: Option<GeoCoordinate>,
    },
    LocalBusiness {
        query: String,
        location: LocationHint,
    },
    FactCheck {
        /// The claim, verbatim after marker stripping
        claim: String,
    },
    AirQuality {
        coords: GeoCoordinate,
    },
    Directions {
        origin: DirectionsOrigin,
        destination: String,
    },
    Timezone {
        place: String,
    },
}

impl CapabilityRequest {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WebSearch { .. } => "web_search",
            Self::LocalBusiness { .. } => "local_business",
            Self::FactCheck { .. } => "fact_check",
            Self::AirQuality { .. } => "air_quality",
            Self::Directions { .. } => "directions",
            Self::Timezone { .. } => "timezone",
        }
    }
}

/// A single-shot backend capability.
///
/// Implementations handle exactly the request variants they are routed; the
/// router guarantees a one-to-one mapping from intent to client.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Invoke the capability once. An `Err` is normalized by the router into
    /// [`CapabilityResult::Error`].
    async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult>;
}

/// The streaming chat capability.
#[async_trait]
pub trait ChatCapability: Send + Sync {
    /// Send one chat turn and return the incremental response channel.
    async fn send(&self, request: ChatRequest) -> Result<ChunkStream>;
}

/// Build the shared HTTP client used by all capability adapters.
///
/// Capability calls carry a client-enforced request timeout; geolocation has
/// its own separate bound in the resolver.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

/// Wire every HTTP capability adapter from configuration.
///
/// This is the production factory; tests construct [`CapabilityRouter`]
/// directly with fakes.
pub fn build_router(endpoints: &CapabilityEndpoints, http: reqwest::Client) -> CapabilityRouter {
    CapabilityRouter::new(
        Arc::new(chat::HttpChatClient::new(
            http.clone(),
            endpoints.chat.clone(),
        )),
        router::RouterClients {
            search: Arc::new(search::WebSearchClient::new(
                http.clone(),
                endpoints.search.clone(),
            )),
            local: Arc::new(local::LocalBusinessClient::new(
                http.clone(),
                endpoints.local_business.clone(),
            )),
            fact_check: Arc::new(factcheck::FactCheckClient::new(
                http.clone(),
                endpoints.fact_check.clone(),
            )),
            air_quality: Arc::new(airquality::AirQualityClient::new(
                http.clone(),
                endpoints.air_quality.clone(),
            )),
            directions: Arc::new(directions::DirectionsClient::new(
                http.clone(),
                endpoints.directions.clone(),
            )),
            timezone: Arc::new(timezone::TimezoneClient::new(http, endpoints.timezone.clone())),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_result_constructors() {
        let prose = CapabilityResult::prose("hello");
        assert!(!prose.is_error());
        assert!(matches!(
            prose,
            CapabilityResult::Prose { ref text, ref citations }
                if text == "hello" && citations.is_empty()
        ));

        let error = CapabilityResult::error("backend down");
        assert!(error.is_error());
    }

    #[test]
    fn test_capability_result_serialization() {
        let result = CapabilityResult::StructuredRecord {
            kind: "timezone".to_string(),
            fields: serde_json::json!({"local_time": "14:02", "utc_offset": "+09:00"}),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"type\":\"structured_record\""));
        assert!(json.contains("\"kind\":\"timezone\""));
    }

    #[test]
    fn test_location_hint_from_coords() {
        let hint: LocationHint = GeoCoordinate::new(42.0, -71.0).into();
        assert_eq!(
            hint,
            LocationHint::Coordinates {
                lat: 42.0,
                lon: -71.0
            }
        );
    }

    #[test]
    fn test_request_name() {
        let request = CapabilityRequest::FactCheck {
            claim: "x".to_string(),
        };
        assert_eq!(request.name(), "fact_check");

        let request = CapabilityRequest::AirQuality {
            coords: GeoCoordinate::new(0.0, 0.0),
        };
        assert_eq!(request.name(), "air_quality");
    }

    #[test]
    fn test_directions_origin_serialization() {
        let sentinel = serde_json::to_string(&DirectionsOrigin::CurrentLocation).unwrap();
        assert!(sentinel.contains("current_location"));

        let coords = serde_json::to_string(&DirectionsOrigin::Coordinates {
            lat: 1.0,
            lon: 2.0,
        })
        .unwrap();
        assert!(coords.contains("\"lat\":1.0"));
    }

    #[test]
    fn test_business_optional_fields_skipped() {
        let business = Business {
            name: "Luigi's".to_string(),
            address: None,
            phone: None,
            rating: Some(4.5),
            open_now: None,
            website: None,
        };
        let json = serde_json::to_string(&business).unwrap();
        assert!(json.contains("\"name\":\"Luigi's\""));
        assert!(json.contains("\"rating\":4.5"));
        assert!(!json.contains("address"));
        assert!(!json.contains("phone"));
    }
}
