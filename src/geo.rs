//! Geolocation acquisition and reverse geocoding.
//!
//! Location-dependent capabilities (local business search, air quality,
//! directions) need device coordinates when the utterance names no explicit
//! place. [`GeoResolver`] acquires them with a bounded timeout and
//! best-effort resolves a human-readable place name for transient status
//! display. Coordinates are scoped to a single turn and never persisted.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TernError};

/// A device coordinate pair, valid for one turn only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GeoCoordinate {
    /// Create a coordinate pair.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// Reverse-geocoded place description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceName {
    /// City or locality
    pub city: String,
    /// Region, state, or country subdivision
    #[serde(default)]
    pub region: Option<String>,
}

impl std::fmt::Display for PlaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}, {}", self.city, region),
            None => write!(f, "{}", self.city),
        }
    }
}

/// Source of device coordinates.
///
/// An `Err` from `current_position` is treated as a denial: the turn is
/// aborted before any capability dispatch and the user receives guidance to
/// grant access or restate the query with an explicit place.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Request the current device coordinates.
    async fn current_position(&self) -> Result<GeoCoordinate>;
}

/// Best-effort coordinate to place-name resolution.
///
/// Failures here are ignored by the resolver; coordinates alone suffice for
/// capability dispatch.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve coordinates to a human-readable place name.
    async fn place_name(&self, coords: GeoCoordinate) -> Result<PlaceName>;
}

/// The location resolved for one turn.
#[derive(Debug, Clone)]
pub struct ResolvedLocation {
    /// Acquired device coordinates
    pub coords: GeoCoordinate,
    /// Human-readable place name, when reverse geocoding succeeded
    pub place_name: Option<String>,
}

/// Acquires coordinates with a bounded timeout and optional reverse geocode.
pub struct GeoResolver {
    provider: std::sync::Arc<dyn GeolocationProvider>,
    geocoder: Option<std::sync::Arc<dyn ReverseGeocoder>>,
    timeout: Duration,
}

impl GeoResolver {
    /// Create a resolver over a provider and optional reverse geocoder.
    ///
    /// # Arguments
    ///
    /// * `provider` - Source of device coordinates
    /// * `geocoder` - Optional reverse geocoder for status display
    /// * `timeout` - Bound on coordinate acquisition
    pub fn new(
        provider: std::sync::Arc<dyn GeolocationProvider>,
        geocoder: Option<std::sync::Arc<dyn ReverseGeocoder>>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            geocoder,
            timeout,
        }
    }

    /// Acquire device coordinates, bounded by the configured timeout.
    ///
    /// On success, reverse geocoding is attempted best-effort; its failure
    /// leaves `place_name` empty. On denial or timeout this returns
    /// [`TernError::GeolocationDenied`] or [`TernError::GeolocationTimeout`]
    /// and the caller must abort capability dispatch.
    pub async fn resolve(&self) -> Result<ResolvedLocation> {
        let coords = match tokio::time::timeout(self.timeout, self.provider.current_position())
            .await
        {
            Ok(Ok(coords)) => coords,
            Ok(Err(err)) => {
                tracing::warn!("Geolocation denied: {}", err);
                return Err(TernError::GeolocationDenied(err.to_string()).into());
            }
            Err(_) => {
                tracing::warn!(
                    "Geolocation timed out after {}s",
                    self.timeout.as_secs()
                );
                return Err(TernError::GeolocationTimeout {
                    timeout_secs: self.timeout.as_secs(),
                }
                .into());
            }
        };

        let place_name = match &self.geocoder {
            Some(geocoder) => match geocoder.place_name(coords).await {
                Ok(place) => Some(place.to_string()),
                Err(err) => {
                    // Coordinates alone suffice; the name is display-only.
                    tracing::debug!("Reverse geocoding failed, continuing: {}", err);
                    None
                }
            },
            None => None,
        };

        Ok(ResolvedLocation { coords, place_name })
    }
}

/// Fixed-coordinate provider, configured once at startup.
///
/// Stands in for a platform geolocation API in the terminal front-end; tests
/// substitute their own [`GeolocationProvider`] fakes.
pub struct StaticPosition {
    coords: Option<GeoCoordinate>,
}

impl StaticPosition {
    /// Provider that always yields the given coordinates.
    pub fn new(coords: GeoCoordinate) -> Self {
        Self {
            coords: Some(coords),
        }
    }

    /// Provider that always denies, for configurations without a position.
    pub fn denied() -> Self {
        Self { coords: None }
    }
}

#[async_trait]
impl GeolocationProvider for StaticPosition {
    async fn current_position(&self) -> Result<GeoCoordinate> {
        match self.coords {
            Some(coords) => Ok(coords),
            None => Err(TernError::GeolocationDenied(
                "no device position configured".to_string(),
            )
            .into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    city: String,
    #[serde(default)]
    region: Option<String>,
}

/// HTTP reverse geocoder: `GET {base}/reverse?lat=..&lon=..` yielding
/// `{city, region}`.
pub struct HttpReverseGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl HttpReverseGeocoder {
    /// Create a reverse geocoder against the given endpoint base URL.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for HttpReverseGeocoder {
    async fn place_name(&self, coords: GeoCoordinate) -> Result<PlaceName> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[("lat", coords.lat), ("lon", coords.lon)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TernError::Capability(format!(
                "reverse geocoder returned {}",
                response.status()
            ))
            .into());
        }

        let body: ReverseGeocodeResponse = response.json().await?;
        Ok(PlaceName {
            city: body.city,
            region: body.region,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct HangingProvider;

    #[async_trait]
    impl GeolocationProvider for HangingProvider {
        async fn current_position(&self) -> Result<GeoCoordinate> {
            // Longer than any test timeout
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    struct FailingGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FailingGeocoder {
        async fn place_name(&self, _coords: GeoCoordinate) -> Result<PlaceName> {
            Err(TernError::Capability("geocoder down".to_string()).into())
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl ReverseGeocoder for FixedGeocoder {
        async fn place_name(&self, _coords: GeoCoordinate) -> Result<PlaceName> {
            Ok(PlaceName {
                city: "Boston".to_string(),
                region: Some("MA".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_resolve_success_with_place_name() {
        let resolver = GeoResolver::new(
            Arc::new(StaticPosition::new(GeoCoordinate::new(42.0, -71.0))),
            Some(Arc::new(FixedGeocoder)),
            Duration::from_secs(1),
        );

        let resolved = resolver.resolve().await.unwrap();
        assert_eq!(resolved.coords, GeoCoordinate::new(42.0, -71.0));
        assert_eq!(resolved.place_name.as_deref(), Some("Boston, MA"));
    }

    #[tokio::test]
    async fn test_resolve_geocoder_failure_is_ignored() {
        let resolver = GeoResolver::new(
            Arc::new(StaticPosition::new(GeoCoordinate::new(42.0, -71.0))),
            Some(Arc::new(FailingGeocoder)),
            Duration::from_secs(1),
        );

        let resolved = resolver.resolve().await.unwrap();
        assert_eq!(resolved.coords, GeoCoordinate::new(42.0, -71.0));
        assert!(resolved.place_name.is_none());
    }

    #[tokio::test]
    async fn test_resolve_denied() {
        let resolver = GeoResolver::new(
            Arc::new(StaticPosition::denied()),
            None,
            Duration::from_secs(1),
        );

        let err = resolver.resolve().await.unwrap_err();
        let tern_err = err.downcast_ref::<TernError>().unwrap();
        assert!(matches!(tern_err, TernError::GeolocationDenied(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_timeout() {
        let resolver = GeoResolver::new(
            Arc::new(HangingProvider),
            None,
            Duration::from_millis(50),
        );

        let err = resolver.resolve().await.unwrap_err();
        let tern_err = err.downcast_ref::<TernError>().unwrap();
        assert!(matches!(tern_err, TernError::GeolocationTimeout { .. }));
    }

    #[test]
    fn test_coordinate_display() {
        let coords = GeoCoordinate::new(42.0, -71.0);
        assert_eq!(coords.to_string(), "(42.0000, -71.0000)");
    }

    #[test]
    fn test_place_name_display() {
        let with_region = PlaceName {
            city: "Boston".to_string(),
            region: Some("MA".to_string()),
        };
        assert_eq!(with_region.to_string(), "Boston, MA");

        let city_only = PlaceName {
            city: "Boston".to_string(),
            region: None,
        };
        assert_eq!(city_only.to_string(), "Boston");
    }
}
