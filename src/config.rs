//! Configuration management for tern
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, TernError};
use crate::geo::GeoCoordinate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for tern
///
/// Holds everything the orchestrator and its clients need: capability
/// endpoints, HTTP and geolocation timeouts, storage location, and the
/// owner recorded on stored conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Capability endpoint configuration, one per backend
    #[serde(default)]
    pub endpoints: CapabilityEndpoints,

    /// Title generation endpoint
    #[serde(default)]
    pub title: EndpointConfig,

    /// Geolocation behavior
    #[serde(default)]
    pub geolocation: GeolocationConfig,

    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Durable storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Owner recorded on every stored conversation and message
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
}

/// One backend endpoint: a base URL and an optional bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

/// Per-capability endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityEndpoints {
    /// Streaming chat endpoint
    #[serde(default)]
    pub chat: EndpointConfig,

    /// Web search endpoint
    #[serde(default)]
    pub search: EndpointConfig,

    /// Local business search endpoint
    #[serde(default)]
    pub local_business: EndpointConfig,

    /// Fact verification endpoint
    #[serde(default)]
    pub fact_check: EndpointConfig,

    /// Air quality endpoint
    #[serde(default)]
    pub air_quality: EndpointConfig,

    /// Directions endpoint
    #[serde(default)]
    pub directions: EndpointConfig,

    /// Time zone endpoint
    #[serde(default)]
    pub timezone: EndpointConfig,
}

/// Geolocation acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Bound on coordinate acquisition (seconds)
    #[serde(default = "default_geolocation_timeout")]
    pub timeout_seconds: u64,

    /// Fixed device position for the terminal front-end; absent means the
    /// provider denies every request
    #[serde(default)]
    pub static_position: Option<GeoCoordinate>,

    /// Optional reverse geocoding endpoint for transient status display
    #[serde(default)]
    pub reverse_geocoder: Option<EndpointConfig>,
}

fn default_geolocation_timeout() -> u64 {
    10
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_geolocation_timeout(),
            static_position: None,
            reverse_geocoder: None,
        }
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Client-enforced timeout for every capability request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the database directory, falling back to the platform data
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`TernError::Config`] when no home directory can be found.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let proj_dirs = ProjectDirs::from("com", "tern", "tern").ok_or_else(|| {
            TernError::Config("Could not determine platform data directory".to_string())
        })?;
        Ok(proj_dirs.data_dir().join("conversations"))
    }
}

fn default_owner_id() -> String {
    "local".to_string()
}

impl Config {
    /// Load configuration from a YAML file, applying environment and CLI
    /// overrides on top. A missing file falls back to defaults.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TernError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| TernError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(owner_id) = std::env::var("TERN_OWNER_ID") {
            self.owner_id = owner_id;
        }

        if let Ok(timeout) = std::env::var("TERN_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.http.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid TERN_REQUEST_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(timeout) = std::env::var("TERN_GEOLOCATION_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.geolocation.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid TERN_GEOLOCATION_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(path) = std::env::var("TERN_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(owner_id) = &cli.owner_id {
            self.owner_id = owner_id.clone();
        }
        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("endpoints.chat", &self.endpoints.chat),
            ("endpoints.search", &self.endpoints.search),
            ("endpoints.local_business", &self.endpoints.local_business),
            ("endpoints.fact_check", &self.endpoints.fact_check),
            ("endpoints.air_quality", &self.endpoints.air_quality),
            ("endpoints.directions", &self.endpoints.directions),
            ("endpoints.timezone", &self.endpoints.timezone),
            ("title", &self.title),
        ];
        for (name, endpoint) in endpoints {
            validate_endpoint(name, endpoint)?;
        }
        if let Some(geocoder) = &self.geolocation.reverse_geocoder {
            validate_endpoint("geolocation.reverse_geocoder", geocoder)?;
        }

        if self.http.request_timeout_seconds == 0 {
            return Err(TernError::Config(
                "http.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.geolocation.timeout_seconds == 0 {
            return Err(TernError::Config(
                "geolocation.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(position) = &self.geolocation.static_position {
            if !(-90.0..=90.0).contains(&position.lat) {
                return Err(TernError::Config(format!(
                    "geolocation.static_position.lat out of range: {}",
                    position.lat
                ))
                .into());
            }
            if !(-180.0..=180.0).contains(&position.lon) {
                return Err(TernError::Config(format!(
                    "geolocation.static_position.lon out of range: {}",
                    position.lon
                ))
                .into());
            }
        }

        if self.owner_id.is_empty() {
            return Err(TernError::Config("owner_id cannot be empty".to_string()).into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: CapabilityEndpoints::default(),
            title: EndpointConfig::default(),
            geolocation: GeolocationConfig::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            owner_id: default_owner_id(),
        }
    }
}

fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.base_url.is_empty() {
        return Err(TernError::Config(format!("{}.base_url cannot be empty", name)).into());
    }
    Url::parse(&endpoint.base_url).map_err(|e| {
        TernError::Config(format!("{}.base_url is not a valid URL: {}", name, e))
    })?;
    Ok(())
}
