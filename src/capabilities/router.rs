//! Intent-to-client dispatch and error normalization.
//!
//! The router owns one client per capability and guarantees the one-to-one
//! mapping from request variant to client. Any transport error, non-success
//! status, or explicit error field surfaces here as a single
//! [`CapabilityResult::Error`], which the transcript renders as one
//! assistant-role message. Dispatch never retries.

use std::sync::Arc;

use super::{Capability, CapabilityRequest, CapabilityResult, ChatCapability};

/// The non-streaming capability clients, one per intent.
pub struct RouterClients {
    pub search: Arc<dyn Capability>,
    pub local: Arc<dyn Capability>,
    pub fact_check: Arc<dyn Capability>,
    pub air_quality: Arc<dyn Capability>,
    pub directions: Arc<dyn Capability>,
    pub timezone: Arc<dyn Capability>,
}

/// Routes a capability request to the matching client.
pub struct CapabilityRouter {
    chat: Arc<dyn ChatCapability>,
    clients: RouterClients,
}

impl CapabilityRouter {
    /// Assemble a router from injected clients.
    pub fn new(chat: Arc<dyn ChatCapability>, clients: RouterClients) -> Self {
        Self { chat, clients }
    }

    /// The streaming chat client, used directly by the orchestrator for
    /// PlainChat turns.
    pub fn chat(&self) -> &dyn ChatCapability {
        self.chat.as_ref()
    }

    /// Dispatch one request to its client, single-shot.
    ///
    /// This is total: a failed call is converted into
    /// [`CapabilityResult::Error`] with a human-readable explanation rather
    /// than propagated, so the turn always settles with something to render.
    pub async fn dispatch(&self, request: CapabilityRequest) -> CapabilityResult {
        let name = request.name();
        tracing::debug!(capability = name, "dispatching capability request");

        let client = match &request {
            CapabilityRequest::WebSearch { .. } => &self.clients.search,
            CapabilityRequest::LocalBusiness { .. } => &self.clients.local,
            CapabilityRequest::FactCheck { .. } => &self.clients.fact_check,
            CapabilityRequest::AirQuality { .. } => &self.clients.air_quality,
            CapabilityRequest::Directions { .. } => &self.clients.directions,
            CapabilityRequest::Timezone { .. } => &self.clients.timezone,
        };

        match client.invoke(request).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(capability = name, "capability call failed: {}", err);
                CapabilityResult::error(format!(
                    "Sorry, the {} service is unavailable right now: {}",
                    name.replace('_', " "),
                    err
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{ChatRequest, ChunkStream};
    use crate::error::{Result, TernError};
    use crate::geo::GeoCoordinate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OkCapability {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Capability for OkCapability {
        async fn invoke(&self, _request: CapabilityRequest) -> Result<CapabilityResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CapabilityResult::prose("ok"))
        }
    }

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        async fn invoke(&self, _request: CapabilityRequest) -> Result<CapabilityResult> {
            Err(TernError::Capability("connection refused".to_string()).into())
        }
    }

    struct NoopChat;

    #[async_trait]
    impl ChatCapability for NoopChat {
        async fn send(&self, _request: ChatRequest) -> Result<ChunkStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn router_with(search: Arc<dyn Capability>, timezone: Arc<dyn Capability>) -> CapabilityRouter {
        let ok = || -> Arc<dyn Capability> {
            Arc::new(OkCapability {
                calls: AtomicUsize::new(0),
            })
        };
        CapabilityRouter::new(
            Arc::new(NoopChat),
            RouterClients {
                search,
                local: ok(),
                fact_check: ok(),
                air_quality: ok(),
                directions: ok(),
                timezone,
            },
        )
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_matching_client() {
        let search = Arc::new(OkCapability {
            calls: AtomicUsize::new(0),
        });
        let timezone = Arc::new(OkCapability {
            calls: AtomicUsize::new(0),
        });
        let router = router_with(search.clone(), timezone.clone());

        router
            .dispatch(CapabilityRequest::WebSearch {
                query: "rust news".to_string(),
                coords: None,
            })
            .await;

        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(timezone.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_normalizes_failure_to_error_result() {
        let search = Arc::new(FailingCapability);
        let timezone = Arc::new(OkCapability {
            calls: AtomicUsize::new(0),
        });
        let router = router_with(search, timezone);

        let result = router
            .dispatch(CapabilityRequest::WebSearch {
                query: "anything".to_string(),
                coords: Some(GeoCoordinate::new(1.0, 2.0)),
            })
            .await;

        match result {
            CapabilityResult::Error { message } => {
                assert!(message.contains("web search"));
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected Error result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_is_single_shot() {
        let search = Arc::new(FailingCapability);
        let timezone = Arc::new(OkCapability {
            calls: AtomicUsize::new(0),
        });
        let router = router_with(search, timezone.clone());

        // A failure produces exactly one Error result and no retry against
        // any client.
        let result = router
            .dispatch(CapabilityRequest::WebSearch {
                query: "q".to_string(),
                coords: None,
            })
            .await;
        assert!(result.is_error());
        assert_eq!(timezone.calls.load(Ordering::SeqCst), 0);
    }
}
