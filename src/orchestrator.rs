//! The conversational turn orchestrator.
//!
//! Owns the full submit-to-settle pipeline for one user utterance: classify
//! intent, resolve geolocation when the capability needs it, dispatch to the
//! matching capability client, assemble the result (directly or via the
//! streaming assembler), and reconcile the in-memory transcript with durable
//! storage.
//!
//! Ordering guarantees per turn:
//!
//! 1. The pending user message is appended locally, creating the conversation
//!    record first when needed (at most one creation per conversation).
//! 2. The user message is durably written; a storage failure aborts the turn
//!    before any capability dispatch.
//! 3. Classification, geolocation, and dispatch run strictly sequentially.
//! 4. The assistant message is committed and persisted on success; any
//!    failure settles the turn with exactly one assistant-role error message.
//! 5. Every ephemeral message is removed and the turn-active guard is cleared
//!    on every exit path.
//!
//! Exactly one turn may be in flight; concurrent submissions are rejected
//! without touching the transcript or any client. There is no queueing, no
//! cancellation, and no automatic retry anywhere in the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ulid::Ulid;

use crate::capabilities::{
    CapabilityRequest, CapabilityResult, CapabilityRouter, ChatRequest, DirectionsOrigin,
    HistoryEntry, LocationHint,
};
use crate::error::TernError;
use crate::geo::GeoResolver;
use crate::intent::{
    extract_claim, extract_destination, extract_timezone_place, Intent, IntentClassifier,
};
use crate::store::ConversationStore;
use crate::streaming::{self, AssemblerEvent};
use crate::title::TitleGenerator;
use crate::transcript::{Lifecycle, Message, MessageContent, Role, Transcript, TurnPhase};

/// Outcome of a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The turn ran to completion (successfully or with an error message)
    Completed,
    /// A turn was already active; nothing was touched
    Busy,
    /// The input was empty after trimming; nothing was touched
    Ignored,
}

/// Live notifications emitted while a turn runs, for front-end rendering.
#[derive(Debug)]
pub enum TurnUpdate<'a> {
    /// The turn state machine entered a new phase
    Phase(TurnPhase),
    /// Transient progress narration (mirrors an ephemeral transcript entry)
    Status(&'a str),
    /// The streaming assistant message was instantiated
    StreamStarted,
    /// Cumulative streamed content so far
    StreamContent(&'a str),
    /// A terminal (non-ephemeral) message was appended or finalized
    Message(&'a Message),
}

const GUIDANCE_DENIED: &str = "I couldn't access your location. Please grant location access, \
or restate your request with a specific place (for example, \"air quality in Boston\").";

const GUIDANCE_TIMEOUT: &str = "Finding your location took too long. Please try again, \
or restate your request with a specific place (for example, \"air quality in Boston\").";

/// The turn orchestrator, constructed once with injected dependencies.
///
/// All collaborators are trait objects so tests can substitute fakes; the
/// production wiring lives in `main.rs`.
pub struct TurnOrchestrator {
    classifier: IntentClassifier,
    router: Arc<CapabilityRouter>,
    store: Arc<dyn ConversationStore>,
    geo: GeoResolver,
    title: Arc<dyn TitleGenerator>,
    owner_id: String,
    transcript: Mutex<Transcript>,
    conversation_id: Mutex<Option<Ulid>>,
    turn_active: AtomicBool,
}

impl TurnOrchestrator {
    /// Assemble an orchestrator from its collaborators.
    ///
    /// # Arguments
    ///
    /// * `router` - Capability dispatch, one client per intent
    /// * `store` - Durable conversation/message gateway
    /// * `geo` - Geolocation resolver with its bounded timeout
    /// * `title` - Title generator fired after the first exchange
    /// * `owner_id` - Owner recorded on every stored conversation and message
    pub fn new(
        router: Arc<CapabilityRouter>,
        store: Arc<dyn ConversationStore>,
        geo: GeoResolver,
        title: Arc<dyn TitleGenerator>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            router,
            store,
            geo,
            title,
            owner_id: owner_id.into(),
            transcript: Mutex::new(Transcript::new()),
            conversation_id: Mutex::new(None),
            turn_active: AtomicBool::new(false),
        }
    }

    /// Read access to the transcript, for rendering and assertions.
    pub fn with_transcript<R>(&self, f: impl FnOnce(&Transcript) -> R) -> R {
        f(&self.transcript.lock().expect("transcript lock poisoned"))
    }

    /// The active conversation id, once the first turn has created it.
    pub fn conversation_id(&self) -> Option<Ulid> {
        *self
            .conversation_id
            .lock()
            .expect("conversation id lock poisoned")
    }

    /// Submit one user utterance without observing live updates.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        self.submit_with(text, |_| {}).await
    }

    /// Submit one user utterance, receiving [`TurnUpdate`] notifications as
    /// the turn progresses.
    ///
    /// Returns [`SubmitOutcome::Busy`] while another turn is active; the
    /// transcript and all clients are left untouched in that case.
    pub async fn submit_with(
        &self,
        text: &str,
        mut observe: impl FnMut(TurnUpdate<'_>),
    ) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        // Single-turn guard: no queueing, no cancellation of the active turn.
        if self
            .turn_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("turn already active, rejecting submission");
            return SubmitOutcome::Busy;
        }

        self.run_turn(text, &mut observe).await;

        // Settle: ephemerals out, guard cleared, input re-enabled. Runs on
        // every exit path of run_turn.
        observe(TurnUpdate::Phase(TurnPhase::Settling));
        {
            let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
            let removed = transcript.clear_ephemeral();
            if removed > 0 {
                tracing::debug!(removed, "cleared ephemeral messages at settle");
            }
        }
        self.turn_active.store(false, Ordering::SeqCst);
        observe(TurnUpdate::Phase(TurnPhase::Idle));

        SubmitOutcome::Completed
    }

    async fn run_turn(&self, text: &str, observe: &mut impl FnMut(TurnUpdate<'_>)) {
        observe(TurnUpdate::Phase(TurnPhase::Submitting));

        // Snapshot taken before this turn's append: drives chat history and
        // the first-exchange title heuristic.
        let (history, committed_before) = {
            let transcript = self.transcript.lock().expect("transcript lock poisoned");
            (chat_history(&transcript), transcript.committed_count())
        };

        // (1) Optimistic local append.
        let user_id = {
            let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
            let id = transcript.push(Role::User, MessageContent::text(text), Lifecycle::Pending);
            if let Some(message) = transcript.get(id) {
                observe(TurnUpdate::Message(message));
            }
            id
        };

        // (2) Durable user write; failure aborts before any dispatch.
        let conversation_id = match self.ensure_conversation().await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!("conversation creation failed: {}", err);
                self.abort_user_write(user_id, observe);
                return;
            }
        };
        if let Err(err) = self
            .store
            .insert_message(
                conversation_id,
                Role::User,
                &MessageContent::text(text),
                &self.owner_id,
            )
            .await
        {
            tracing::warn!("user message write failed: {}", err);
            self.abort_user_write(user_id, observe);
            return;
        }
        self.set_lifecycle(user_id, Lifecycle::Committed);

        // (3) Classify.
        observe(TurnUpdate::Phase(TurnPhase::Classifying));
        let intent = self.classifier.classify(text);
        let explicit_place = self.classifier.explicit_place(text);
        tracing::info!(%intent, explicit_place = ?explicit_place, "classified utterance");

        // (4) Geolocation, only when the capability needs coordinates the
        // utterance does not supply.
        let location = if intent.needs_geolocation(explicit_place.is_some()) {
            observe(TurnUpdate::Phase(TurnPhase::GeoResolving));
            self.push_status("Getting your location...", observe);
            match self.geo.resolve().await {
                Ok(resolved) => {
                    if let Some(name) = &resolved.place_name {
                        self.push_status(&format!("Using your location near {}...", name), observe);
                    }
                    Some(resolved)
                }
                Err(err) => {
                    // Denial or timeout: abort dispatch entirely and
                    // substitute guidance. No capability call is made.
                    let guidance = match err.downcast_ref::<TernError>() {
                        Some(TernError::GeolocationTimeout { .. }) => GUIDANCE_TIMEOUT,
                        _ => GUIDANCE_DENIED,
                    };
                    self.finish_assistant(
                        conversation_id,
                        CapabilityResult::prose(guidance),
                        committed_before,
                        observe,
                    )
                    .await;
                    return;
                }
            }
        } else {
            None
        };

        // (5) Dispatch.
        observe(TurnUpdate::Phase(TurnPhase::Dispatching));
        let result = match intent {
            Intent::PlainChat => self.dispatch_chat(text, history, observe).await,
            Intent::WebSearch => {
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::WebSearch {
                        query: text.to_string(),
                        coords: location.as_ref().map(|l| l.coords),
                    })
                    .await
            }
            Intent::LocalBusiness => {
                let hint = match (&location, explicit_place) {
                    (Some(resolved), _) => resolved.coords.into(),
                    (None, Some(name)) => LocationHint::Place { name },
                    // Geolocation covers the no-place case; unreachable in
                    // practice, but the fallback keeps dispatch total.
                    (None, None) => LocationHint::Place {
                        name: String::new(),
                    },
                };
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::LocalBusiness {
                        query: text.to_string(),
                        location: hint,
                    })
                    .await
            }
            Intent::FactCheck => {
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::FactCheck {
                        claim: extract_claim(text),
                    })
                    .await
            }
            Intent::AirQuality => {
                let coords = match &location {
                    Some(resolved) => resolved.coords,
                    None => unreachable!("air quality dispatch requires resolved coordinates"),
                };
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::AirQuality { coords })
                    .await
            }
            Intent::Directions => {
                let origin = match &location {
                    Some(resolved) => DirectionsOrigin::Coordinates {
                        lat: resolved.coords.lat,
                        lon: resolved.coords.lon,
                    },
                    None => DirectionsOrigin::CurrentLocation,
                };
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::Directions {
                        origin,
                        destination: extract_destination(text),
                    })
                    .await
            }
            Intent::Timezone => {
                observe(TurnUpdate::Phase(TurnPhase::Awaiting));
                self.router
                    .dispatch(CapabilityRequest::Timezone {
                        place: extract_timezone_place(text),
                    })
                    .await
            }
        };

        // (6)+(7) Commit, persist, fire the title trigger.
        self.finish_assistant(conversation_id, result, committed_before, observe)
            .await;
    }

    /// PlainChat path: stream the reply, replacing one in-progress message
    /// with the cumulative concatenation as chunks arrive.
    async fn dispatch_chat(
        &self,
        text: &str,
        history: Vec<HistoryEntry>,
        observe: &mut impl FnMut(TurnUpdate<'_>),
    ) -> CapabilityResult {
        let typing_id = self.push_status("Thinking...", observe);

        let stream = match self
            .router
            .chat()
            .send(ChatRequest {
                message: text.to_string(),
                history,
            })
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("chat capability call failed: {}", err);
                return CapabilityResult::error(format!(
                    "Sorry, the chat service is unavailable right now: {}",
                    err
                ));
            }
        };

        observe(TurnUpdate::Phase(TurnPhase::Streaming));
        let mut assistant_id: Option<Ulid> = None;
        let outcome = streaming::assemble(stream, |event| match event {
            AssemblerEvent::Started => {
                let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
                // First chunk: clear the typing indicator, instantiate the
                // streaming assistant message.
                transcript.remove(typing_id);
                let id = transcript.push(
                    Role::Assistant,
                    MessageContent::text(""),
                    Lifecycle::Pending,
                );
                transcript.set_streaming(id, true);
                assistant_id = Some(id);
                observe(TurnUpdate::StreamStarted);
            }
            AssemblerEvent::ContentUpdated(content) => {
                if let Some(id) = assistant_id {
                    let mut transcript =
                        self.transcript.lock().expect("transcript lock poisoned");
                    transcript.set_content(id, MessageContent::text(content));
                }
                observe(TurnUpdate::StreamContent(content));
            }
        })
        .await;

        // The streamed message is re-appended by finish_assistant as the
        // terminal message; drop the in-progress entry either way.
        if let Some(id) = assistant_id {
            let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
            transcript.remove(id);
        }

        match outcome {
            Ok(full) if full.is_empty() => {
                CapabilityResult::error("The chat service returned an empty response.".to_string())
            }
            Ok(full) => CapabilityResult::prose(full),
            Err(err) => {
                // Partial text is discarded in favor of the error message.
                tracing::warn!("chat stream failed mid-turn: {}", err);
                CapabilityResult::error(format!("The response was interrupted: {}", err))
            }
        }
    }

    /// Append the terminal assistant message, persist it when it is not an
    /// error, and fire the title trigger when this completed the first
    /// exchange.
    async fn finish_assistant(
        &self,
        conversation_id: Ulid,
        result: CapabilityResult,
        committed_before: usize,
        observe: &mut impl FnMut(TurnUpdate<'_>),
    ) {
        let is_error = result.is_error();
        let content = render_result(result);
        let assistant_id = {
            let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
            // No status message may coexist with the terminal reply.
            let removed = transcript.clear_ephemeral();
            if removed > 0 {
                tracing::debug!(removed, "cleared status messages before the terminal reply");
            }
            let lifecycle = if is_error {
                Lifecycle::Error
            } else {
                Lifecycle::Pending
            };
            transcript.push(Role::Assistant, content.clone(), lifecycle)
        };

        // Error messages are display-only; they are never durably stored.
        let mut committed = false;
        if !is_error {
            match self
                .store
                .insert_message(conversation_id, Role::Assistant, &content, &self.owner_id)
                .await
            {
                Ok(()) => {
                    self.set_lifecycle(assistant_id, Lifecycle::Committed);
                    committed = true;
                }
                Err(err) => {
                    // The reply stays visible; only durability was lost.
                    tracing::warn!("assistant message write failed: {}", err);
                }
            }
        }

        {
            let transcript = self.transcript.lock().expect("transcript lock poisoned");
            if let Some(message) = transcript.get(assistant_id) {
                observe(TurnUpdate::Message(message));
            }
        }

        // Fire-and-forget title trigger after the first completed exchange.
        if committed && committed_before <= 1 {
            let title = Arc::clone(&self.title);
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                match title.generate_title(conversation_id).await {
                    Ok(generated) => {
                        if let Err(err) = store.set_title(conversation_id, &generated).await {
                            tracing::debug!("title write failed: {}", err);
                        } else {
                            tracing::debug!(title = %generated, "conversation title set");
                        }
                    }
                    Err(err) => {
                        tracing::debug!("title generation failed: {}", err);
                    }
                }
            });
        }
    }

    /// Lazily create the conversation record; at most one creation call per
    /// conversation lifetime.
    async fn ensure_conversation(&self) -> crate::error::Result<Ulid> {
        if let Some(id) = self.conversation_id() {
            return Ok(id);
        }
        let id = self.store.create_conversation(&self.owner_id, None).await?;
        *self
            .conversation_id
            .lock()
            .expect("conversation id lock poisoned") = Some(id);
        Ok(id)
    }

    /// Abort path for a failed user-message write: the user entry is marked
    /// terminal and one local-only error message explains the failure.
    fn abort_user_write(&self, user_id: Ulid, observe: &mut impl FnMut(TurnUpdate<'_>)) {
        let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
        transcript.set_lifecycle(user_id, Lifecycle::Error);
        let id = transcript.push(
            Role::Assistant,
            MessageContent::text(
                "Your message could not be saved. Please check the connection and try again.",
            ),
            Lifecycle::Error,
        );
        if let Some(message) = transcript.get(id) {
            observe(TurnUpdate::Message(message));
        }
    }

    fn push_status(&self, text: &str, observe: &mut impl FnMut(TurnUpdate<'_>)) -> Ulid {
        let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
        let id = transcript.push_ephemeral(text);
        observe(TurnUpdate::Status(text));
        id
    }

    fn set_lifecycle(&self, id: Ulid, lifecycle: Lifecycle) {
        self.transcript
            .lock()
            .expect("transcript lock poisoned")
            .set_lifecycle(id, lifecycle);
    }
}

/// Prior committed text turns, oldest first, for chat context.
fn chat_history(transcript: &Transcript) -> Vec<HistoryEntry> {
    transcript
        .messages()
        .iter()
        .filter(|m| m.lifecycle == Lifecycle::Committed)
        .filter_map(|m| {
            m.content.as_text().map(|text| HistoryEntry {
                role: m.role.as_str().to_string(),
                content: text.to_string(),
            })
        })
        .collect()
}

/// Render a capability result into message content.
///
/// Entity lists and structured records keep their structure for dedicated
/// views; prose carries its citations as trailing source lines.
fn render_result(result: CapabilityResult) -> MessageContent {
    match result {
        CapabilityResult::Prose { text, citations } => {
            if citations.is_empty() {
                MessageContent::text(text)
            } else {
                let mut rendered = text;
                rendered.push_str("\n\nSources:");
                for citation in citations {
                    rendered.push_str(&format!("\n- {} ({})", citation.title, citation.url));
                }
                MessageContent::text(rendered)
            }
        }
        CapabilityResult::EntityList { businesses } => MessageContent::structured(
            "local_businesses",
            serde_json::json!({ "businesses": businesses }),
        ),
        CapabilityResult::StructuredRecord { kind, fields } => {
            MessageContent::structured(kind, fields)
        }
        CapabilityResult::Error { message } => MessageContent::text(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::router::RouterClients;
    use crate::capabilities::{Capability, ChatCapability, ChunkStream, Citation};
    use crate::error::Result;
    use crate::geo::{GeoCoordinate, GeolocationProvider, StaticPosition};
    use crate::store::{StoredConversation, StoredMessage};
    use crate::title::TitleGenerator;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    // ---- Fakes ----

    #[derive(Default)]
    struct MemoryStore {
        conversations: Mutex<Vec<StoredConversation>>,
        messages: Mutex<Vec<StoredMessage>>,
        fail_message_writes: AtomicBool,
    }

    impl MemoryStore {
        fn failing_writes() -> Self {
            let store = Self::default();
            store.fail_message_writes.store(true, Ordering::SeqCst);
            store
        }

        fn message_count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }

        fn title_of(&self, id: Ulid) -> Option<String> {
            self.conversations
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| c.title.clone())
        }
    }

    #[async_trait]
    impl ConversationStore for MemoryStore {
        async fn create_conversation(
            &self,
            owner_id: &str,
            title: Option<&str>,
        ) -> Result<Ulid> {
            let record = StoredConversation {
                id: Ulid::new(),
                owner_id: owner_id.to_string(),
                created_at: Utc::now(),
                title: title.map(str::to_string),
            };
            let id = record.id;
            self.conversations.lock().unwrap().push(record);
            Ok(id)
        }

        async fn insert_message(
            &self,
            conversation_id: Ulid,
            role: Role,
            content: &MessageContent,
            owner_id: &str,
        ) -> Result<()> {
            if self.fail_message_writes.load(Ordering::SeqCst) {
                return Err(TernError::Storage("disk full".to_string()).into());
            }
            self.messages.lock().unwrap().push(StoredMessage {
                id: Ulid::new(),
                conversation_id,
                role,
                content: content.clone(),
                owner_id: owner_id.to_string(),
                created_at: Utc::now(),
            });
            Ok(())
        }

        async fn list_messages(&self, conversation_id: Ulid) -> Result<Vec<StoredMessage>> {
            Ok(self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect())
        }

        async fn get_conversation(
            &self,
            conversation_id: Ulid,
        ) -> Result<Option<StoredConversation>> {
            Ok(self
                .conversations
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == conversation_id)
                .cloned())
        }

        async fn set_title(&self, conversation_id: Ulid, title: &str) -> Result<()> {
            let mut conversations = self.conversations.lock().unwrap();
            let record = conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or_else(|| TernError::Storage("missing conversation".to_string()))?;
            record.title = Some(title.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingCapability {
        requests: Mutex<Vec<CapabilityRequest>>,
        result: Mutex<Option<CapabilityResult>>,
    }

    impl RecordingCapability {
        fn returning(result: CapabilityResult) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                result: Mutex::new(Some(result)),
            }
        }

        fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> Option<CapabilityRequest> {
            self.requests.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl Capability for RecordingCapability {
        async fn invoke(&self, request: CapabilityRequest) -> Result<CapabilityResult> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| CapabilityResult::prose("ok")))
        }
    }

    struct FailingCapability;

    #[async_trait]
    impl Capability for FailingCapability {
        async fn invoke(&self, _request: CapabilityRequest) -> Result<CapabilityResult> {
            Err(TernError::Capability("backend unreachable".to_string()).into())
        }
    }

    struct ScriptedChat {
        chunks: Vec<Result<String>>,
    }

    impl ScriptedChat {
        fn with_text(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| Ok(c.to_string())).collect(),
            }
        }
    }

    #[async_trait]
    impl ChatCapability for ScriptedChat {
        async fn send(&self, _request: ChatRequest) -> Result<ChunkStream> {
            let chunks: Vec<Result<String>> = self
                .chunks
                .iter()
                .map(|c| match c {
                    Ok(text) => Ok(text.clone()),
                    Err(err) => Err(TernError::Capability(err.to_string()).into()),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct FixedTitle {
        calls: AtomicUsize,
    }

    impl FixedTitle {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TitleGenerator for FixedTitle {
        async fn generate_title(&self, _conversation_id: Ulid) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Generated title".to_string())
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl GeolocationProvider for SlowProvider {
        async fn current_position(&self) -> Result<GeoCoordinate> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    // ---- Harness ----

    struct Harness {
        orchestrator: TurnOrchestrator,
        store: Arc<MemoryStore>,
        capability: Arc<RecordingCapability>,
        title: Arc<FixedTitle>,
    }

    fn harness() -> Harness {
        harness_with(
            Arc::new(MemoryStore::default()),
            Arc::new(StaticPosition::new(GeoCoordinate::new(42.0, -71.0))),
            Arc::new(ScriptedChat::with_text(&["Hello!"])),
        )
    }

    fn harness_with(
        store: Arc<MemoryStore>,
        provider: Arc<dyn GeolocationProvider>,
        chat: Arc<dyn ChatCapability>,
    ) -> Harness {
        let capability = Arc::new(RecordingCapability::default());
        let title = Arc::new(FixedTitle::new());
        let router = Arc::new(CapabilityRouter::new(
            chat,
            RouterClients {
                search: capability.clone(),
                local: capability.clone(),
                fact_check: capability.clone(),
                air_quality: capability.clone(),
                directions: capability.clone(),
                timezone: capability.clone(),
            },
        ));
        let orchestrator = TurnOrchestrator::new(
            router,
            store.clone(),
            GeoResolver::new(provider, None, Duration::from_millis(200)),
            title.clone(),
            "owner-1",
        );
        Harness {
            orchestrator,
            store,
            capability,
            title,
        }
    }

    async fn settle_background_tasks() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // ---- Tests ----

    #[tokio::test]
    async fn test_local_business_turn_threads_coordinates() {
        let h = harness();
        let outcome = h.orchestrator.submit("pizza places near me").await;
        assert_eq!(outcome, SubmitOutcome::Completed);

        match h.capability.last_request() {
            Some(CapabilityRequest::LocalBusiness { location, .. }) => {
                assert_eq!(
                    location,
                    LocationHint::Coordinates {
                        lat: 42.0,
                        lon: -71.0
                    }
                );
            }
            other => panic!("expected LocalBusiness request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fact_check_turn_strips_claim() {
        let h = harness();
        h.orchestrator.submit("fact check: the earth is flat").await;

        match h.capability.last_request() {
            Some(CapabilityRequest::FactCheck { claim }) => {
                assert_eq!(claim, "the earth is flat");
            }
            other => panic!("expected FactCheck request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_explicit_place_skips_geolocation() {
        let store = Arc::new(MemoryStore::default());
        // A hanging provider would time the turn out if geolocation ran.
        let h = harness_with(
            store,
            Arc::new(SlowProvider),
            Arc::new(ScriptedChat::with_text(&["hi"])),
        );
        h.orchestrator.submit("restaurants in Boston").await;

        match h.capability.last_request() {
            Some(CapabilityRequest::LocalBusiness { location, .. }) => {
                assert_eq!(
                    location,
                    LocationHint::Place {
                        name: "Boston".to_string()
                    }
                );
            }
            other => panic!("expected LocalBusiness request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_geolocation_denied_substitutes_guidance_without_dispatch() {
        let h = harness_with(
            Arc::new(MemoryStore::default()),
            Arc::new(StaticPosition::denied()),
            Arc::new(ScriptedChat::with_text(&["hi"])),
        );
        h.orchestrator
            .submit("what's the air quality in my area")
            .await;

        assert_eq!(h.capability.call_count(), 0);
        h.orchestrator.with_transcript(|t| {
            let assistants: Vec<_> = t
                .messages()
                .iter()
                .filter(|m| m.role == Role::Assistant)
                .collect();
            assert_eq!(assistants.len(), 1);
            assert!(assistants[0]
                .content
                .as_text()
                .unwrap()
                .contains("grant location access"));
            assert!(!t.has_ephemeral());
        });
    }

    #[tokio::test]
    async fn test_status_messages_cleared_before_terminal_reply() {
        let h = harness();
        let mut coexisted = false;
        h.orchestrator
            .submit_with("pizza places near me", |update| {
                // Settle has not swept the transcript yet at this point; a
                // status entry still present here would have coexisted with
                // the appended reply.
                if matches!(update, TurnUpdate::Phase(TurnPhase::Settling)) {
                    h.orchestrator.with_transcript(|t| {
                        let reply_present = t.messages().iter().any(|m| {
                            m.role == Role::Assistant && m.lifecycle != Lifecycle::Ephemeral
                        });
                        coexisted = reply_present && t.has_ephemeral();
                    });
                }
            })
            .await;

        assert!(
            !coexisted,
            "status messages must be removed before the terminal reply is appended"
        );
    }

    #[tokio::test]
    async fn test_web_search_turn_reports_awaiting_phase() {
        let h = harness();
        let mut phases = Vec::new();
        h.orchestrator
            .submit_with("search for rust news", |update| {
                if let TurnUpdate::Phase(phase) = update {
                    phases.push(phase);
                }
            })
            .await;

        assert!(phases.contains(&TurnPhase::Awaiting));
    }

    #[tokio::test]
    async fn test_busy_guard_rejects_concurrent_submission() {
        let h = harness();
        // Simulate an active turn.
        h.orchestrator.turn_active.store(true, Ordering::SeqCst);

        let len_before = h.orchestrator.with_transcript(|t| t.len());
        let outcome = h.orchestrator.submit("hello").await;

        assert_eq!(outcome, SubmitOutcome::Busy);
        assert_eq!(h.orchestrator.with_transcript(|t| t.len()), len_before);
        assert_eq!(h.capability.call_count(), 0);
        assert_eq!(h.store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let h = harness();
        assert_eq!(h.orchestrator.submit("   ").await, SubmitOutcome::Ignored);
        assert_eq!(h.orchestrator.with_transcript(|t| t.len()), 0);
    }

    #[tokio::test]
    async fn test_capability_error_yields_single_error_message_and_clears_guard() {
        let capability = Arc::new(RecordingCapability::default());
        let failing: Arc<dyn Capability> = Arc::new(FailingCapability);
        let title = Arc::new(FixedTitle::new());
        let store = Arc::new(MemoryStore::default());
        let router = Arc::new(CapabilityRouter::new(
            Arc::new(ScriptedChat::with_text(&["hi"])),
            RouterClients {
                search: failing.clone(),
                local: capability.clone(),
                fact_check: capability.clone(),
                air_quality: capability.clone(),
                directions: capability.clone(),
                timezone: capability.clone(),
            },
        ));
        let orchestrator = TurnOrchestrator::new(
            router,
            store.clone(),
            GeoResolver::new(
                Arc::new(StaticPosition::new(GeoCoordinate::new(0.0, 0.0))),
                None,
                Duration::from_millis(200),
            ),
            title,
            "owner-1",
        );

        orchestrator.submit("search for rust news").await;

        orchestrator.with_transcript(|t| {
            let errors: Vec<_> = t
                .messages()
                .iter()
                .filter(|m| m.role == Role::Assistant && m.lifecycle == Lifecycle::Error)
                .collect();
            assert_eq!(errors.len(), 1);
            assert!(!t.has_ephemeral());
        });
        // Error messages are display-only; only the user turn was stored.
        assert_eq!(store.message_count(), 1);

        // Guard cleared: a new submission is accepted.
        assert_eq!(
            orchestrator.submit("hello again").await,
            SubmitOutcome::Completed
        );
    }

    #[tokio::test]
    async fn test_streaming_concatenation_and_typing_indicator() {
        let h = harness_with(
            Arc::new(MemoryStore::default()),
            Arc::new(StaticPosition::new(GeoCoordinate::new(0.0, 0.0))),
            Arc::new(ScriptedChat::with_text(&["Hel", "lo ", "world"])),
        );

        let mut saw_stream_start = false;
        let mut snapshots = Vec::new();
        h.orchestrator
            .submit_with("tell me something nice", |update| match update {
                TurnUpdate::StreamStarted => saw_stream_start = true,
                TurnUpdate::StreamContent(text) => snapshots.push(text.to_string()),
                _ => {}
            })
            .await;

        assert!(saw_stream_start);
        assert_eq!(snapshots, vec!["Hel", "Hello ", "Hello world"]);
        h.orchestrator.with_transcript(|t| {
            let last = t.messages().last().unwrap();
            assert_eq!(last.content.as_text(), Some("Hello world"));
            assert_eq!(last.lifecycle, Lifecycle::Committed);
            assert!(!t.has_ephemeral());
        });
    }

    #[tokio::test]
    async fn test_persist_failure_aborts_before_dispatch() {
        let h = harness_with(
            Arc::new(MemoryStore::failing_writes()),
            Arc::new(StaticPosition::new(GeoCoordinate::new(0.0, 0.0))),
            Arc::new(ScriptedChat::with_text(&["hi"])),
        );

        h.orchestrator.submit("search for rust news").await;

        assert_eq!(h.capability.call_count(), 0);
        h.orchestrator.with_transcript(|t| {
            let user = t
                .messages()
                .iter()
                .find(|m| m.role == Role::User)
                .unwrap();
            assert_eq!(user.lifecycle, Lifecycle::Error);
            assert!(!t.has_ephemeral());
        });
    }

    #[tokio::test]
    async fn test_title_fires_once_after_first_exchange() {
        let h = harness();
        h.orchestrator.submit("hello there").await;
        settle_background_tasks().await;

        assert_eq!(h.title.calls.load(Ordering::SeqCst), 1);
        let conversation_id = h.orchestrator.conversation_id().unwrap();
        assert_eq!(
            h.store.title_of(conversation_id).as_deref(),
            Some("Generated title")
        );

        // A second exchange does not fire the trigger again.
        h.orchestrator.submit("and another thing").await;
        settle_background_tasks().await;
        assert_eq!(h.title.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conversation_created_once() {
        let h = harness();
        h.orchestrator.submit("first").await;
        let first = h.orchestrator.conversation_id().unwrap();
        h.orchestrator.submit("second").await;
        assert_eq!(h.orchestrator.conversation_id().unwrap(), first);
        assert_eq!(h.store.conversations.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timezone_turn_strips_place() {
        let h = harness();
        h.orchestrator.submit("what time is it in Tokyo?").await;

        match h.capability.last_request() {
            Some(CapabilityRequest::Timezone { place }) => assert_eq!(place, "Tokyo"),
            other => panic!("expected Timezone request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directions_with_explicit_place_uses_sentinel_origin() {
        let h = harness_with(
            Arc::new(MemoryStore::default()),
            Arc::new(SlowProvider),
            Arc::new(ScriptedChat::with_text(&["hi"])),
        );
        h.orchestrator
            .submit("directions to the office at Kendall Square")
            .await;

        match h.capability.last_request() {
            Some(CapabilityRequest::Directions { origin, .. }) => {
                assert_eq!(origin, DirectionsOrigin::CurrentLocation);
            }
            other => panic!("expected Directions request, got {:?}", other),
        }
    }

    #[test]
    fn test_render_prose_with_citations() {
        let content = render_result(CapabilityResult::Prose {
            text: "Rust 1.80 released.".to_string(),
            citations: vec![Citation {
                title: "Release notes".to_string(),
                url: "https://example.com/rust".to_string(),
            }],
        });
        let text = content.as_text().unwrap();
        assert!(text.starts_with("Rust 1.80 released."));
        assert!(text.contains("Sources:"));
        assert!(text.contains("https://example.com/rust"));
    }

    #[test]
    fn test_render_entity_list_is_structured() {
        let content = render_result(CapabilityResult::EntityList {
            businesses: vec![],
        });
        assert!(content.as_text().is_none());
    }
}
