//! Mock implementations for testing
//!
//! These mocks enable integration testing of the workflow manager without
//! real I/O.

use super::manager::{ProcessOutcome, WorkflowManager};
use super::traits::*;
use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::handlers::{DispatchTable, HandlerPolicy};
use crate::snapshots::InMemorySnapshotStore;
use crate::state_machine::{
    ClientId, Context, InboundEvent, MediaItem, MediaSource, OutboundMessage, Platform,
    RenderedAsset, Schedule, WorkflowState,
};
use crate::store::{CasOutcome, ContextStore, InMemoryContextStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Caption Generator
// ============================================================================

/// Caption generator that returns queued responses
pub struct MockCaptionGenerator {
    responses: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<CaptionRequest>>,
}

impl MockCaptionGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_caption(&self, caption: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(caption.into()));
    }

    pub fn queue_error(&self, error: CollaboratorError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<CaptionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCaptionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptionGenerator for MockCaptionGenerator {
    async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::network("No mock caption queued")))
    }
}

// ============================================================================
// Delayed Mock Caption Generator (for timeout and supersede testing)
// ============================================================================

/// Caption generator that answers after a fixed delay
pub struct DelayedMockCaptionGenerator {
    inner: Arc<MockCaptionGenerator>,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockCaptionGenerator {
    pub fn new(inner: Arc<MockCaptionGenerator>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl CaptionGenerator for DelayedMockCaptionGenerator {
    async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, CollaboratorError> {
        self.request_started.notify_waiters();
        tokio::time::sleep(self.delay).await;
        self.inner.generate_caption(request).await
    }
}

// ============================================================================
// Mock Media Provider
// ============================================================================

/// Media provider with fixed search results
pub struct MockMediaProvider {
    results: Vec<MediaItem>,
    /// Record of searches made
    pub searches: Mutex<Vec<(String, MediaSource)>>,
}

impl MockMediaProvider {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(mut self, results: Vec<MediaItem>) -> Self {
        self.results = results;
        self
    }
}

impl Default for MockMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for MockMediaProvider {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError> {
        self.searches
            .lock()
            .unwrap()
            .push((query.to_string(), source));
        Ok(self
            .results
            .iter()
            .cloned()
            .map(|item| MediaItem { source, ..item })
            .collect())
    }

    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        Ok(RenderedAsset {
            url: format!("{}#canvas", media.url),
            caption: caption.to_string(),
        })
    }
}

// ============================================================================
// Mock Publisher
// ============================================================================

/// Publisher that succeeds unless told otherwise per platform
pub struct MockPublisher {
    failing: HashSet<Platform>,
    slow: HashMap<Platform, Duration>,
    /// Record of publish calls
    pub published: Mutex<Vec<(Platform, PostAsset, Schedule)>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            slow: HashMap::new(),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, platform: Platform) -> Self {
        self.failing.insert(platform);
        self
    }

    pub fn slow_on(mut self, platform: Platform, delay: Duration) -> Self {
        self.slow.insert(platform, delay);
        self
    }

    pub fn recorded_publishes(&self) -> Vec<(Platform, PostAsset, Schedule)> {
        self.published.lock().unwrap().clone()
    }
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(
        &self,
        platform: Platform,
        asset: &PostAsset,
        schedule: &Schedule,
    ) -> Result<PublishReceipt, CollaboratorError> {
        self.published
            .lock()
            .unwrap()
            .push((platform, asset.clone(), *schedule));
        if let Some(delay) = self.slow.get(&platform) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&platform) {
            return Err(CollaboratorError::server_error(format!(
                "{} returned 503",
                platform.as_str()
            )));
        }
        Ok(PublishReceipt {
            reference: format!("{}-post-1", platform.as_str()),
        })
    }
}

// ============================================================================
// Clock and Transport
// ============================================================================

/// Clock that only moves when told to
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Transport that keeps everything it was asked to deliver
#[derive(Default)]
pub struct RecordingTransport {
    pub delivered: Mutex<Vec<(ClientId, Vec<OutboundMessage>)>>,
    pub delivered_notify: Notify,
}

impl RecordingTransport {
    pub fn deliveries(&self) -> Vec<(ClientId, Vec<OutboundMessage>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(
        &self,
        client: &ClientId,
        messages: &[OutboundMessage],
    ) -> Result<(), CollaboratorError> {
        self.delivered
            .lock()
            .unwrap()
            .push((client.clone(), messages.to_vec()));
        self.delivered_notify.notify_waiters();
        Ok(())
    }
}

// ============================================================================
// Racing Context Store
// ============================================================================

/// Context store where another writer sneaks in before the next few commits.
///
/// Each injected write rewrites the current context unchanged, so the state
/// stays the same while the revision moves on.
pub struct RacingStore {
    inner: InMemoryContextStore,
    passes: AtomicUsize,
    interference: AtomicUsize,
}

impl RacingStore {
    pub fn new(interference: usize) -> Self {
        Self {
            inner: InMemoryContextStore::new(),
            passes: AtomicUsize::new(0),
            interference: AtomicUsize::new(interference),
        }
    }

    /// Let the next `passes` commits through, then interfere with `interference` more
    pub fn interfere_after(&self, passes: usize, interference: usize) {
        self.passes.store(passes, Ordering::SeqCst);
        self.interference.store(interference, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContextStore for RacingStore {
    async fn get(&self, client: &ClientId) -> StoreResult<Context> {
        self.inner.get(client).await
    }

    async fn compare_and_set(
        &self,
        client: &ClientId,
        expected_revision: u64,
        context: Context,
    ) -> StoreResult<CasOutcome> {
        let passing = self
            .passes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let interfere = !passing
            && self
                .interference
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if interfere {
            let current = self.inner.get(client).await?;
            self.inner
                .compare_and_set(client, current.revision, current)
                .await?;
        }
        self.inner
            .compare_and_set(client, expected_revision, context)
            .await
    }

    async fn delete(&self, client: &ClientId) -> StoreResult<()> {
        self.inner.delete(client).await
    }

    async fn expire_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ClientId>> {
        self.inner.expire_idle(cutoff).await
    }

    async fn len(&self) -> usize {
        self.inner.len().await
    }
}

// ============================================================================
// Test Workflow Builder
// ============================================================================

pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 0).unwrap()
}

/// A manager wired to mocks, talking as one client
pub struct TestWorkflow<S: ContextStore = Arc<InMemoryContextStore>> {
    pub manager: WorkflowManager<S, Arc<InMemorySnapshotStore>>,
    pub snapshots: Arc<InMemorySnapshotStore>,
    pub captions: Arc<MockCaptionGenerator>,
    pub publisher: Arc<MockPublisher>,
    pub media: Arc<MockMediaProvider>,
    pub clock: Arc<FixedClock>,
    pub client: ClientId,
    next_delivery: AtomicU64,
}

pub struct TestWorkflowBuilder {
    config: EngineConfig,
    caption_delay: Option<Duration>,
    media: MockMediaProvider,
    publisher: MockPublisher,
    policies: Vec<(WorkflowState, HandlerPolicy)>,
    dispatch: Option<DispatchTable>,
}

impl TestWorkflow {
    pub fn builder() -> TestWorkflowBuilder {
        TestWorkflowBuilder {
            config: EngineConfig::default(),
            caption_delay: None,
            media: MockMediaProvider::new(),
            publisher: MockPublisher::new(),
            policies: Vec::new(),
            dispatch: None,
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }
}

impl TestWorkflowBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn caption_delay(mut self, delay: Duration) -> Self {
        self.caption_delay = Some(delay);
        self
    }

    pub fn media(mut self, media: MockMediaProvider) -> Self {
        self.media = media;
        self
    }

    pub fn publisher(mut self, publisher: MockPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn policy(mut self, state: WorkflowState, policy: HandlerPolicy) -> Self {
        self.policies.push((state, policy));
        self
    }

    pub fn dispatch(mut self, table: DispatchTable) -> Self {
        self.dispatch = Some(table);
        self
    }

    pub fn build(self) -> TestWorkflow {
        self.build_with_store(Arc::new(InMemoryContextStore::new()))
            .expect("test workflow should build")
    }

    pub fn build_with_store<S: ContextStore>(
        self,
        store: S,
    ) -> Result<TestWorkflow<S>, ConfigurationError> {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let captions = Arc::new(MockCaptionGenerator::new());
        let media = Arc::new(self.media);
        let publisher = Arc::new(self.publisher);
        let clock = Arc::new(FixedClock::new(test_now()));

        let caption_collaborator: Arc<dyn CaptionGenerator> = match self.caption_delay {
            Some(delay) => Arc::new(DelayedMockCaptionGenerator::new(captions.clone(), delay)),
            None => captions.clone(),
        };

        let mut builder = WorkflowManager::builder(store, snapshots.clone())
            .config(self.config)
            .captions(caption_collaborator)
            .media(media.clone())
            .publisher(publisher.clone())
            .clock(clock.clone());
        if let Some(table) = self.dispatch {
            builder = builder.dispatch(table);
        }
        for (state, policy) in self.policies {
            builder = builder.policy(state, policy);
        }

        Ok(TestWorkflow {
            manager: builder.build()?,
            snapshots,
            captions,
            publisher,
            media,
            clock,
            client: ClientId::new("+15550123"),
            next_delivery: AtomicU64::new(1),
        })
    }
}

impl<S: ContextStore> TestWorkflow<S> {
    /// Send text with a fresh delivery id
    pub async fn send(&self, text: &str) -> ProcessOutcome {
        let id = self.next_delivery.fetch_add(1, Ordering::SeqCst);
        self.send_with_id(&format!("d-{id}"), text).await
    }

    pub async fn send_with_id(&self, delivery_id: &str, text: &str) -> ProcessOutcome {
        self.manager
            .process_message(&self.client, InboundEvent::text(delivery_id, text))
            .await
    }

    pub async fn send_event(&self, event: InboundEvent) -> ProcessOutcome {
        self.manager.process_message(&self.client, event).await
    }

    pub async fn context(&self) -> Context {
        self.manager.store().get(&self.client).await.unwrap()
    }

    /// Walk the happy path up to confirmation: tips, all platforms, no image, now
    pub async fn drive_to_confirmation(&self) {
        self.captions.queue_caption("Pack light, travel far.");
        for text in ["hi", "tips", "all", "Packing tips for a weekend trip", "y", "no", "now"] {
            let outcome = self.send(text).await;
            assert_eq!(
                outcome.disposition,
                super::Disposition::Advanced,
                "step {text:?} did not advance: {outcome:?}"
            );
        }
        assert_eq!(self.context().await.state, WorkflowState::Confirmation);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerEnv, HandlerResult, StateHandler};
    use crate::runtime::{Disposition, SweepReport};
    use crate::snapshots::{FailureKind, SnapshotQuery};
    use crate::state_machine::{Input, Transition};

    fn error_id(outcome: &ProcessOutcome) -> crate::snapshots::ErrorId {
        match &outcome.disposition {
            Disposition::Failed { error_id } | Disposition::Transient { error_id } => {
                error_id.clone()
            }
            other => panic!("expected a failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greeting_sends_single_content_type_prompt() {
        let wf = TestWorkflow::new();
        let outcome = wf.send("Hi").await;

        assert_eq!(outcome.disposition, Disposition::Advanced);
        assert_eq!(outcome.state, WorkflowState::ContentTypeSelection);
        assert_eq!(outcome.messages.len(), 1);
        assert!(matches!(
            &outcome.messages[0],
            OutboundMessage::Buttons { buttons, .. } if buttons.len() == 6
        ));
    }

    #[tokio::test]
    async fn test_unrecognized_input_in_init_reprompts() {
        let wf = TestWorkflow::new();
        let outcome = wf.send("what is this").await;
        assert_eq!(outcome.disposition, Disposition::Reprompted);
        assert_eq!(outcome.state, WorkflowState::Init);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(wf.manager.store().len().await, 0);
    }

    #[tokio::test]
    async fn test_replayed_delivery_is_duplicate() {
        let wf = TestWorkflow::new();
        wf.send_with_id("wamid.1", "hi").await;
        let revision = wf.context().await.revision;

        let replay = wf.send_with_id("wamid.1", "hi").await;
        assert_eq!(replay.disposition, Disposition::Duplicate);
        assert!(replay.messages.is_empty());
        assert_eq!(replay.state, WorkflowState::ContentTypeSelection);
        assert_eq!(wf.context().await.revision, revision);
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_advances_once() {
        let wf = Arc::new(
            TestWorkflow::builder()
                .caption_delay(Duration::from_millis(150))
                .build(),
        );
        wf.captions.queue_caption("First caption");
        wf.captions.queue_caption("Second caption");
        wf.captions.queue_caption("Third caption");
        for text in ["hi", "tips", "linkedin", "Conference takeaways"] {
            wf.send(text).await;
        }
        let before = wf.context().await.revision;

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let wf = wf.clone();
                tokio::spawn(async move { wf.send_with_id("wamid.regen", "n").await })
            })
            .collect();
        let mut dispositions = Vec::new();
        for attempt in attempts {
            dispositions.push(attempt.await.unwrap().disposition);
        }

        let advanced = dispositions
            .iter()
            .filter(|d| **d == Disposition::Advanced)
            .count();
        let duplicates = dispositions
            .iter()
            .filter(|d| **d == Disposition::Duplicate)
            .count();
        assert_eq!((advanced, duplicates), (1, 1), "{dispositions:?}");

        let ctx = wf.context().await;
        assert_eq!(ctx.revision, before + 1);
        assert_eq!(ctx.candidate_caption.as_deref(), Some("Second caption"));
        assert_eq!(wf.captions.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_delivery_id_is_never_deduplicated() {
        let wf = TestWorkflow::new();
        let event = || InboundEvent {
            delivery_id: None,
            payload: crate::state_machine::Payload::Text { text: "hi".into() },
        };
        assert_eq!(wf.send_event(event()).await.disposition, Disposition::Advanced);
        // Second greeting is not a content type, but it must be processed
        assert_eq!(
            wf.send_event(event()).await.disposition,
            Disposition::Reprompted
        );
    }

    #[tokio::test]
    async fn test_image_decision_branches() {
        let wf = TestWorkflow::new();
        wf.captions.queue_caption("Pack light, travel far.");
        for text in ["hi", "tips", "instagram", "Packing tips", "y"] {
            wf.send(text).await;
        }
        assert_eq!(
            wf.context().await.state,
            WorkflowState::ImageInclusionDecision
        );

        let yes = wf.send("yes").await;
        assert_eq!(yes.state, WorkflowState::MediaSourceSelection);

        let wf = TestWorkflow::new();
        wf.captions.queue_caption("Pack light, travel far.");
        for text in ["hi", "tips", "instagram", "Packing tips", "y"] {
            wf.send(text).await;
        }
        let no = wf.send("no").await;
        assert_eq!(no.state, WorkflowState::ScheduleSelection);
        assert_eq!(wf.context().await.include_media, Some(false));
    }

    #[tokio::test]
    async fn test_past_and_too_soon_schedules_rejected() {
        let wf = TestWorkflow::new();
        wf.captions.queue_caption("Pack light, travel far.");
        for text in ["hi", "tips", "all", "Packing tips", "y", "no"] {
            wf.send(text).await;
        }
        let revision = wf.context().await.revision;

        for reply in ["2026-03-14 12:00", "2026-03-14 15:35"] {
            let outcome = wf.send(reply).await;
            assert_eq!(outcome.disposition, Disposition::Reprompted);
            assert_eq!(outcome.state, WorkflowState::ScheduleSelection);
            assert_eq!(outcome.messages.len(), 2);
            assert_eq!(wf.context().await.revision, revision);
        }

        let ok = wf.send("2026-03-15 10:00").await;
        assert_eq!(ok.state, WorkflowState::Confirmation);
        assert!(ok.messages[0].body().contains("2026-03-15 10:00 UTC"));
    }

    #[tokio::test]
    async fn test_generation_timeout_records_one_snapshot() {
        let wf = TestWorkflow::builder()
            .caption_delay(Duration::from_millis(500))
            .policy(
                WorkflowState::CaptionGeneration,
                HandlerPolicy {
                    timeout: Duration::from_millis(50),
                    conflict_retries: 1,
                },
            )
            .build();
        wf.captions.queue_caption("too late");
        for text in ["hi", "promo", "instagram"] {
            wf.send(text).await;
        }

        let outcome = wf.send("Spring sale, everything 20% off").await;
        let id = error_id(&outcome);
        assert!(id.as_str().starts_with("GEN-"));
        assert_eq!(outcome.state, WorkflowState::CaptionGeneration);
        assert!(outcome
            .messages
            .last()
            .is_some_and(|m| m.body().contains(id.as_str())));
        assert_eq!(wf.context().await.state, WorkflowState::CaptionGeneration);

        let snapshot = wf.manager.get_error_snapshot(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.kind, FailureKind::CollaboratorFailure);
        assert_eq!(snapshot.state, WorkflowState::CaptionGeneration);
        assert_eq!(
            snapshot.context.caption_prompt.as_deref(),
            Some("Spring sale, everything 20% off")
        );
        let all = wf
            .manager
            .list_recent_errors(&SnapshotQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_collaborator_error_keeps_state_and_allows_retry() {
        let wf = TestWorkflow::new();
        wf.captions
            .queue_error(CollaboratorError::rate_limit("slow down"));
        wf.captions.queue_caption("Second time lucky");
        for text in ["hi", "events", "linkedin"] {
            wf.send(text).await;
        }

        let failed = wf.send("Launch party on Friday").await;
        assert!(matches!(failed.disposition, Disposition::Failed { .. }));
        assert_eq!(failed.state, WorkflowState::CaptionGeneration);

        let retried = wf.send("try again").await;
        assert_eq!(retried.disposition, Disposition::Advanced);
        assert_eq!(
            wf.context().await.candidate_caption.as_deref(),
            Some("Second time lucky")
        );
    }

    #[tokio::test]
    async fn test_partial_publish_completes_with_snapshot() {
        let wf = TestWorkflow::builder()
            .publisher(MockPublisher::new().failing_on(Platform::Linkedin))
            .build();
        wf.drive_to_confirmation().await;

        let outcome = wf.send("y").await;
        assert_eq!(outcome.disposition, Disposition::Advanced);
        assert_eq!(outcome.state, WorkflowState::PostExecution);

        let summary = outcome.messages[0].body();
        assert!(summary.contains("✅ Instagram"));
        assert!(summary.contains("❌ LinkedIn"));

        let snapshots = wf
            .manager
            .list_recent_errors(&SnapshotQuery {
                kind: Some(FailureKind::PartialExecutionFailure),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].error_id.as_str().starts_with("PUB-"));
        assert_eq!(snapshots[0].context.post_results.len(), 2);
        assert!(outcome.messages[1]
            .body()
            .contains(snapshots[0].error_id.as_str()));

        assert_eq!(wf.publisher.recorded_publishes().len(), 2);
        assert_eq!(wf.manager.store().len().await, 0);
    }

    #[tokio::test]
    async fn test_cancel_from_any_active_state() {
        let wf = TestWorkflow::new();
        wf.send("hi").await;
        wf.send("seasonal").await;

        let outcome = wf.send("Cancel").await;
        assert_eq!(outcome.disposition, Disposition::Advanced);
        assert_eq!(outcome.state, WorkflowState::Cancelled);
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(wf.manager.store().len().await, 0);

        let restarted = wf.send("hello").await;
        assert_eq!(restarted.state, WorkflowState::ContentTypeSelection);
    }

    #[tokio::test]
    async fn test_confirmation_no_restarts() {
        let wf = TestWorkflow::new();
        wf.drive_to_confirmation().await;

        let outcome = wf.send("n").await;
        assert_eq!(outcome.state, WorkflowState::ContentTypeSelection);
        let ctx = wf.context().await;
        assert!(ctx.content_type.is_none());
        assert!(ctx.approved_caption.is_none());
        assert!(wf.publisher.recorded_publishes().is_empty());
    }

    #[tokio::test]
    async fn test_media_flow_renders_asset_for_publishing() {
        let wf = TestWorkflow::builder()
            .media(MockMediaProvider::new().with_results(vec![
                MediaItem::new("https://img/beach.jpg", MediaSource::Unsplash),
                MediaItem::new("https://img/bag.jpg", MediaSource::Unsplash),
            ]))
            .build();
        wf.captions.queue_caption("Pack light, travel far.");
        for text in ["hi", "tips", "instagram", "Packing tips", "y", "yes"] {
            wf.send(text).await;
        }

        let options = wf.send("unsplash").await;
        assert_eq!(options.state, WorkflowState::MediaSourceSelection);
        assert_eq!(options.messages.len(), 3);

        let chosen = wf.send("2").await;
        assert_eq!(chosen.state, WorkflowState::ScheduleSelection);
        wf.send("now").await;
        wf.send("yes").await;

        let published = wf.publisher.recorded_publishes();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0].1.media_url.as_deref(),
            Some("https://img/bag.jpg#canvas")
        );
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried_transparently() {
        let wf = TestWorkflow::builder()
            .build_with_store(RacingStore::new(1))
            .unwrap();
        let outcome = wf.send("hi").await;
        assert_eq!(outcome.disposition, Disposition::Advanced);
        assert_eq!(outcome.state, WorkflowState::ContentTypeSelection);
    }

    #[tokio::test]
    async fn test_persistent_conflict_is_transient_and_redeliverable() {
        let wf = TestWorkflow::builder()
            .build_with_store(RacingStore::new(2))
            .unwrap();

        let outcome = wf.send_with_id("m-1", "hi").await;
        let id = error_id(&outcome);
        assert!(matches!(outcome.disposition, Disposition::Transient { .. }));
        assert!(id.as_str().starts_with("CON-"));
        let snapshot = wf.manager.get_error_snapshot(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.kind, FailureKind::ConcurrencyConflict);

        let redelivered = wf.send_with_id("m-1", "hi").await;
        assert_eq!(redelivered.disposition, Disposition::Advanced);
    }

    #[tokio::test]
    async fn test_conflict_after_chained_commit_keeps_delivery_claim() {
        let wf = TestWorkflow::builder()
            .build_with_store(RacingStore::new(0))
            .unwrap();
        wf.drive_to_confirmation().await;
        wf.manager.store().interfere_after(1, 1);

        let outcome = wf.send_with_id("confirm-1", "y").await;
        assert!(matches!(outcome.disposition, Disposition::Transient { .. }));
        assert_eq!(outcome.state, WorkflowState::PostExecution);
        let published = wf.publisher.recorded_publishes().len();
        assert!(published > 0);

        let redelivered = wf.send_with_id("confirm-1", "y").await;
        assert_eq!(redelivered.disposition, Disposition::Duplicate);
        assert!(redelivered.messages.is_empty());
        assert_eq!(wf.publisher.recorded_publishes().len(), published);
    }

    #[tokio::test]
    async fn test_cancel_supersedes_in_flight_generation() {
        let wf = Arc::new(
            TestWorkflow::builder()
                .caption_delay(Duration::from_millis(200))
                .build(),
        );
        wf.captions.queue_caption("First caption");
        wf.captions.queue_caption("Second caption");
        for text in ["hi", "tips", "linkedin", "Conference takeaways"] {
            wf.send(text).await;
        }
        assert_eq!(
            wf.context().await.candidate_caption.as_deref(),
            Some("First caption")
        );

        let regen = {
            let wf = wf.clone();
            tokio::spawn(async move { wf.send("n").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cancelled = wf.send("cancel").await;
        assert_eq!(cancelled.state, WorkflowState::Cancelled);

        let outcome = regen.await.unwrap();
        assert_eq!(outcome.disposition, Disposition::Superseded);
        assert!(outcome.messages.is_empty());
        assert_eq!(wf.manager.store().len().await, 0);
    }

    struct BrokenInit;

    #[async_trait]
    impl StateHandler for BrokenInit {
        fn state(&self) -> WorkflowState {
            WorkflowState::Init
        }

        async fn handle(&self, _ctx: &Context, _input: &Input, _env: &HandlerEnv) -> HandlerResult {
            Ok(Transition::to(WorkflowState::Confirmation))
        }
    }

    #[tokio::test]
    async fn test_schema_violation_is_internal_failure() {
        let wf = TestWorkflow::builder()
            .dispatch(DispatchTable::standard().override_handler(BrokenInit))
            .build();
        let outcome = wf.send("hi").await;
        let id = error_id(&outcome);
        assert!(id.as_str().starts_with("ENG-"));
        assert_eq!(outcome.state, WorkflowState::Init);
        let snapshot = wf.manager.get_error_snapshot(&id).await.unwrap().unwrap();
        assert_eq!(snapshot.kind, FailureKind::InternalFailure);
        assert!(snapshot.message.contains("content_type"));
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_and_purges_old_snapshots() {
        let wf = TestWorkflow::new();
        wf.send("hi").await;
        wf.captions.queue_error(CollaboratorError::network("offline"));
        wf.send("tips").await;
        wf.send("instagram").await;
        wf.send("Packing tips").await;
        assert_eq!(wf.snapshots.len().await, 1);

        let report = wf
            .manager
            .sweep(test_now() + chrono::Duration::minutes(30))
            .await;
        assert_eq!(
            report,
            SweepReport {
                expired_contexts: 0,
                pruned_deliveries: 4,
                purged_snapshots: 0,
            }
        );

        let report = wf.manager.sweep(test_now() + chrono::Duration::days(15)).await;
        assert_eq!(report.expired_contexts, 1);
        assert_eq!(report.purged_snapshots, 1);
        assert_eq!(wf.manager.store().len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_with_unbounded_windows_keeps_everything() {
        let config = EngineConfig {
            inactivity_timeout: chrono::Duration::MAX,
            snapshot_retention: chrono::Duration::MAX,
            dedup_window: chrono::Duration::MAX,
            ..EngineConfig::default()
        };
        let wf = TestWorkflow::builder().config(config).build();
        wf.send("hi").await;
        wf.captions.queue_error(CollaboratorError::network("offline"));
        wf.send("tips").await;
        wf.send("instagram").await;
        wf.send("Packing tips").await;

        let report = wf.manager.sweep(test_now() + chrono::Duration::days(3650)).await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(wf.snapshots.len().await, 1);
        assert_eq!(wf.manager.store().len().await, 1);
        assert_eq!(wf.send_with_id("d-1", "hi").await.disposition, Disposition::Duplicate);
    }

    #[test]
    fn test_builder_rejects_bad_configuration() {
        let missing = TestWorkflow::builder()
            .dispatch(DispatchTable::empty().with_handler(crate::handlers::InitHandler))
            .build_with_store(Arc::new(InMemoryContextStore::new()));
        assert!(matches!(
            missing.err(),
            Some(ConfigurationError::MissingHandler(_))
        ));

        let config = EngineConfig {
            restart_state: WorkflowState::Confirmation,
            ..EngineConfig::default()
        };
        let bad_restart = TestWorkflow::builder()
            .config(config)
            .build_with_store(Arc::new(InMemoryContextStore::new()));
        assert!(matches!(
            bad_restart.err(),
            Some(ConfigurationError::InvalidRestartState(
                WorkflowState::Confirmation
            ))
        ));
    }

    #[test]
    fn test_policies_resolved_at_build() {
        let wf = TestWorkflow::builder()
            .policy(
                WorkflowState::ScheduleSelection,
                HandlerPolicy {
                    timeout: Duration::from_secs(1),
                    conflict_retries: 3,
                },
            )
            .build();
        let config = EngineConfig::default();
        assert_eq!(
            wf.manager.policy(WorkflowState::ScheduleSelection),
            Some(HandlerPolicy {
                timeout: Duration::from_secs(1),
                conflict_retries: 3
            })
        );
        assert_eq!(
            wf.manager.policy(WorkflowState::PostExecution),
            Some(HandlerPolicy::publishing(&config))
        );
        assert_eq!(wf.manager.policy(WorkflowState::Cancelled), None);
    }
}
