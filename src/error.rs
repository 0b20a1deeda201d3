//! Error types for Tern
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Tern operations
///
/// This enum encompasses all possible errors that can occur during a
/// conversational turn: configuration loading, geolocation acquisition,
/// capability dispatch, durable storage, and title generation.
#[derive(Error, Debug)]
pub enum TernError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Geolocation was denied by the provider
    #[error("Geolocation denied: {0}")]
    GeolocationDenied(String),

    /// Geolocation acquisition exceeded the configured timeout
    #[error("Geolocation timed out after {timeout_secs}s")]
    GeolocationTimeout {
        /// The configured timeout that was exceeded
        timeout_secs: u64,
    },

    /// Capability call errors (network failure, non-success status,
    /// explicit error field in the response body)
    #[error("Capability error: {0}")]
    Capability(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Title generation errors (always swallowed by the trigger)
    #[error("Title generation error: {0}")]
    TitleGeneration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Tern operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
