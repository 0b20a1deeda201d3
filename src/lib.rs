//! tern - multi-capability chat turn orchestrator
//!
//! This library provides the core functionality for a terminal chat client
//! whose responses are assembled from heterogeneous backend capabilities:
//! streaming conversation, web search, fact verification, air quality,
//! directions, time zones, and location-scoped business search.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `orchestrator`: the submit-to-settle turn pipeline and its guarantees
//! - `intent`: priority-ordered regex cascade mapping text to one intent
//! - `geo`: geolocation acquisition and reverse geocoding
//! - `capabilities`: one client per backend plus routing and normalization
//! - `streaming`: incremental assembly of the streamed chat response
//! - `transcript`: in-memory message list with typed lifecycles
//! - `store`: durable conversation/message gateway (sled-backed)
//! - `title`: fire-and-forget conversation title generation
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `chat_mode`: command-line definition and terminal front-end
//!
//! # Example
//!
//! ```no_run
//! use tern::config::Config;
//! use tern::chat_mode;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let orchestrator = chat_mode::build_orchestrator(&config)?;
//!     orchestrator.submit("what time is it in Tokyo?").await;
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod chat_mode;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod intent;
pub mod orchestrator;
pub mod store;
pub mod streaming;
pub mod title;
pub mod transcript;

// Re-export commonly used types
pub use capabilities::{CapabilityResult, CapabilityRouter};
pub use config::Config;
pub use error::{Result, TernError};
pub use intent::{Intent, IntentClassifier};
pub use orchestrator::{SubmitOutcome, TurnOrchestrator, TurnUpdate};
pub use transcript::{Lifecycle, Message, MessageContent, Role, Transcript};
