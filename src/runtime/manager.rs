//! Workflow manager: routes inbound events through the state handlers
//!
//! For every event the manager claims the delivery id, loads the client's
//! context, runs the handler of the current state under its time budget and
//! commits the result with compare-and-set. No lock is held while a handler
//! runs; a commit that loses the race is retried or discarded depending on
//! whether the client is still in the same state.

use super::traits::{CaptionGenerator, Clock, MediaProvider, Publisher, SystemClock};
use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::handlers::{DispatchTable, HandlerEnv, HandlerError, HandlerPolicy};
use crate::snapshots::{
    ErrorId, ErrorRecorder, ErrorSnapshot, Failure, FailureKind, FailureOrigin, SnapshotQuery,
    SnapshotResult, SnapshotStore,
};
use crate::state_machine::{
    ClientId, Context, InboundEvent, Input, OutboundMessage, Transition, WorkflowState,
};
use crate::store::{CasOutcome, ContextStore, DeliveryLog, StoreError};
use crate::templates::TemplateRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// How an event was handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Disposition {
    /// At least one transition was committed
    Advanced,
    /// Input was not usable; nothing was committed
    Reprompted,
    /// A collaborator or the engine failed; state unchanged
    Failed { error_id: ErrorId },
    /// Lost the commit race after retrying; the event may be redelivered
    Transient { error_id: ErrorId },
    /// The client moved on while the handler ran; its result was discarded
    Superseded,
    /// Delivery id already processed
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub messages: Vec<OutboundMessage>,
    pub state: WorkflowState,
    pub disposition: Disposition,
}

/// Housekeeping counts from one [`WorkflowManager::sweep`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_contexts: usize,
    pub pruned_deliveries: usize,
    pub purged_snapshots: usize,
}

/// Result of one handler step
enum Step {
    Committed {
        state: WorkflowState,
        messages: Vec<OutboundMessage>,
        chain: bool,
    },
    Reprompt {
        state: WorkflowState,
        messages: Vec<OutboundMessage>,
    },
    Failed {
        state: WorkflowState,
        error_id: ErrorId,
        messages: Vec<OutboundMessage>,
    },
    Transient {
        state: WorkflowState,
        error_id: ErrorId,
        messages: Vec<OutboundMessage>,
    },
    Superseded {
        state: WorkflowState,
    },
}

pub struct WorkflowManager<S, E> {
    store: S,
    recorder: ErrorRecorder<E>,
    deliveries: DeliveryLog,
    table: DispatchTable,
    policies: HashMap<WorkflowState, HandlerPolicy>,
    templates: TemplateRegistry,
    env: HandlerEnv,
}

impl<S: ContextStore, E: SnapshotStore> WorkflowManager<S, E> {
    pub fn builder(store: S, snapshots: E) -> WorkflowManagerBuilder<S, E> {
        WorkflowManagerBuilder::new(store, snapshots)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.env.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Effective policy for the handler of `state`
    pub fn policy(&self, state: WorkflowState) -> Option<HandlerPolicy> {
        self.policies.get(&state).copied()
    }

    /// Handle one inbound event for `client`
    pub async fn process_message(&self, client: &ClientId, event: InboundEvent) -> ProcessOutcome {
        let delivery_id = event.delivery_id_or_assign();
        let now = self.env.clock.now();

        if !self.deliveries.claim(client, &delivery_id, now) {
            tracing::info!(client_id = %client, delivery_id = %delivery_id, "Duplicate delivery ignored");
            return ProcessOutcome {
                messages: vec![],
                state: self.current_state(client).await.unwrap_or_default(),
                disposition: Disposition::Duplicate,
            };
        }

        let input = Input::from(event.payload);
        tracing::debug!(client_id = %client, delivery_id = %delivery_id, input = input.kind(), "Processing event");
        let (outcome, committed) = self.run(client, input).await;

        // A redelivery may retry only if this event left no committed trace
        if matches!(outcome.disposition, Disposition::Transient { .. }) && !committed {
            self.deliveries.release(client, &delivery_id);
        }
        outcome
    }

    pub async fn current_state(&self, client: &ClientId) -> Result<WorkflowState, StoreError> {
        Ok(self.store.get(client).await?.state)
    }

    pub async fn get_error_snapshot(&self, id: &ErrorId) -> SnapshotResult<Option<ErrorSnapshot>> {
        self.recorder.store().get(id).await
    }

    pub async fn list_recent_errors(&self, query: &SnapshotQuery) -> SnapshotResult<Vec<ErrorSnapshot>> {
        self.recorder.store().query(query).await
    }

    /// Expire idle contexts, prune the delivery window and purge old snapshots
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let config = &self.env.config;
        // A cutoff before the representable range means nothing is old enough yet
        let expired_contexts = match now.checked_sub_signed(config.inactivity_timeout) {
            None => 0,
            Some(cutoff) => match self.store.expire_idle(cutoff).await {
                Ok(expired) => {
                    for client in &expired {
                        tracing::info!(client_id = %client, "Expired idle context");
                    }
                    expired.len()
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to expire idle contexts");
                    0
                }
            },
        };
        let purged_snapshots = match now.checked_sub_signed(config.snapshot_retention) {
            None => 0,
            Some(cutoff) => match self.recorder.store().purge_before(cutoff).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to purge error snapshots");
                    0
                }
            },
        };

        SweepReport {
            expired_contexts,
            pruned_deliveries: self.deliveries.prune(now),
            purged_snapshots,
        }
    }

    /// Run the first step and any chained entries that follow it.
    /// The flag is true when at least one step committed.
    async fn run(&self, client: &ClientId, mut input: Input) -> (ProcessOutcome, bool) {
        let mut messages = Vec::new();
        let mut advanced = false;

        loop {
            let (state, disposition) = match self.step(client, &input).await {
                Step::Committed {
                    state,
                    messages: produced,
                    chain,
                } => {
                    messages.extend(produced);
                    advanced = true;
                    if chain {
                        input = Input::Enter;
                        continue;
                    }
                    (state, Disposition::Advanced)
                }
                Step::Reprompt {
                    state,
                    messages: produced,
                } => {
                    messages.extend(produced);
                    let disposition = if advanced {
                        Disposition::Advanced
                    } else {
                        Disposition::Reprompted
                    };
                    (state, disposition)
                }
                Step::Failed {
                    state,
                    error_id,
                    messages: produced,
                } => {
                    messages.extend(produced);
                    (state, Disposition::Failed { error_id })
                }
                Step::Transient {
                    state,
                    error_id,
                    messages: produced,
                } => {
                    messages.extend(produced);
                    (state, Disposition::Transient { error_id })
                }
                Step::Superseded { state } => (state, Disposition::Superseded),
            };

            let outcome = ProcessOutcome {
                messages,
                state,
                disposition,
            };
            return (outcome, advanced);
        }
    }

    async fn step(&self, client: &ClientId, input: &Input) -> Step {
        let mut ctx = match self.store.get(client).await {
            Ok(ctx) => ctx,
            Err(e) => {
                let fallback = Context::new(self.env.clock.now());
                return self.internal_failure(client, &fallback, e.to_string()).await;
            }
        };

        let cancel = input.is_cancel()
            && !ctx.state.is_terminal()
            && ctx.state != WorkflowState::Init;
        let policy = self
            .policies
            .get(&ctx.state)
            .copied()
            .unwrap_or_else(|| HandlerPolicy::fast(&self.env.config));
        let mut retries_left = policy.conflict_retries;

        loop {
            let result = if cancel {
                tracing::info!(client_id = %client, state = %ctx.state, "Cancel requested");
                Ok(Transition::to(WorkflowState::Cancelled))
            } else {
                self.invoke(client, &ctx, input, policy).await
            };

            let transition = match result {
                Ok(transition) => transition,
                Err(step) => return step,
            };

            let now = self.env.clock.now();
            let next = ctx.advanced(transition.next_state, transition.updates.clone(), now);
            match self
                .store
                .compare_and_set(client, ctx.revision, next.clone())
                .await
            {
                Ok(CasOutcome::Committed { revision }) => {
                    tracing::info!(
                        client_id = %client,
                        from = %ctx.state,
                        to = %next.state,
                        revision,
                        "Committed transition"
                    );
                    let committed = Context { revision, ..next };
                    return self.after_commit(client, committed, transition).await;
                }
                Ok(CasOutcome::Conflict { current_revision }) => {
                    let latest = match self.store.get(client).await {
                        Ok(latest) => latest,
                        Err(e) => return self.internal_failure(client, &ctx, e.to_string()).await,
                    };
                    if latest.state != ctx.state {
                        tracing::info!(
                            client_id = %client,
                            expected = %ctx.state,
                            actual = %latest.state,
                            "Discarding superseded handler result"
                        );
                        return Step::Superseded {
                            state: latest.state,
                        };
                    }
                    if retries_left > 0 {
                        retries_left -= 1;
                        tracing::debug!(client_id = %client, current_revision, "Commit conflict, retrying");
                        ctx = latest;
                        continue;
                    }

                    let error_id = self
                        .record(
                            client,
                            &latest,
                            FailureKind::ConcurrencyConflict,
                            FailureOrigin::Concurrency,
                            format!(
                                "lost commit in {} at revision {} (now {current_revision})",
                                ctx.state, ctx.revision
                            ),
                        )
                        .await;
                    return Step::Transient {
                        state: latest.state,
                        messages: vec![failure_notice(&error_id)],
                        error_id,
                    };
                }
                Err(e) => return self.internal_failure(client, &ctx, e.to_string()).await,
            }
        }
    }

    /// Run the handler for `ctx.state` under its time budget
    async fn invoke(
        &self,
        client: &ClientId,
        ctx: &Context,
        input: &Input,
        policy: HandlerPolicy,
    ) -> Result<Transition, Step> {
        let Some(handler) = self.table.get(ctx.state) else {
            return Err(self
                .internal_failure(client, ctx, format!("no handler for state {}", ctx.state))
                .await);
        };

        let result = tokio::time::timeout(policy.timeout, handler.handle(ctx, input, &self.env)).await;
        let error = match result {
            Ok(Ok(transition)) => return Ok(transition),
            Ok(Err(error)) => error,
            Err(_) => {
                let message = format!(
                    "handler for {} timed out after {}ms",
                    ctx.state,
                    policy.timeout.as_millis()
                );
                return Err(self
                    .failure(
                        client,
                        ctx,
                        FailureKind::CollaboratorFailure,
                        timeout_origin(ctx.state),
                        message,
                    )
                    .await);
            }
        };

        Err(match error {
            HandlerError::Validation(message) => {
                tracing::debug!(client_id = %client, state = %ctx.state, reason = %message, "Validation failure");
                let mut messages = vec![OutboundMessage::text(message)];
                messages.extend(self.templates.render(ctx.state, ctx));
                Step::Reprompt {
                    state: ctx.state,
                    messages,
                }
            }
            HandlerError::Unrecognized => Step::Reprompt {
                state: ctx.state,
                messages: self.templates.render(ctx.state, ctx),
            },
            HandlerError::Collaborator { origin, source } => {
                self.failure(
                    client,
                    ctx,
                    FailureKind::CollaboratorFailure,
                    origin,
                    source.to_string(),
                )
                .await
            }
            HandlerError::Internal(message) => self.internal_failure(client, ctx, message).await,
        })
    }

    async fn after_commit(&self, client: &ClientId, committed: Context, transition: Transition) -> Step {
        let Transition {
            messages: mut produced,
            prompt,
            chain,
            failed_platforms,
            ..
        } = transition;

        if !failed_platforms.is_empty() {
            let detail = failed_platforms
                .iter()
                .map(|(platform, reason)| format!("{}: {reason}", platform.as_str()))
                .collect::<Vec<_>>()
                .join("; ");
            let error_id = self
                .record(
                    client,
                    &committed,
                    FailureKind::PartialExecutionFailure,
                    FailureOrigin::Publishing,
                    detail,
                )
                .await;
            produced.push(OutboundMessage::text(format!(
                "Some platforms could not be reached. Reference: {error_id}"
            )));
        }

        if prompt {
            produced.extend(self.templates.render(committed.state, &committed));
        }

        if committed.state.is_terminal() && !chain {
            self.archive(client).await;
        }

        Step::Committed {
            state: committed.state,
            messages: produced,
            chain,
        }
    }

    async fn failure(
        &self,
        client: &ClientId,
        ctx: &Context,
        kind: FailureKind,
        origin: FailureOrigin,
        message: String,
    ) -> Step {
        let error_id = self.record(client, ctx, kind, origin, message).await;
        if ctx.state.is_terminal() {
            self.archive(client).await;
        }
        Step::Failed {
            state: ctx.state,
            messages: vec![failure_notice(&error_id)],
            error_id,
        }
    }

    async fn internal_failure(&self, client: &ClientId, ctx: &Context, message: String) -> Step {
        self.failure(
            client,
            ctx,
            FailureKind::InternalFailure,
            FailureOrigin::Engine,
            message,
        )
        .await
    }

    async fn record(
        &self,
        client: &ClientId,
        ctx: &Context,
        kind: FailureKind,
        origin: FailureOrigin,
        message: String,
    ) -> ErrorId {
        let failure = Failure {
            client_id: client.clone(),
            context: ctx.clone(),
            kind,
            origin,
            message,
        };
        self.recorder.record(failure, self.env.clock.now()).await
    }

    /// Drop a finished conversation
    async fn archive(&self, client: &ClientId) {
        if let Err(e) = self.store.delete(client).await {
            tracing::error!(client_id = %client, error = %e, "Failed to delete finished context");
        }
    }
}

fn timeout_origin(state: WorkflowState) -> FailureOrigin {
    match state {
        WorkflowState::CaptionGeneration => FailureOrigin::Generation,
        WorkflowState::MediaSourceSelection | WorkflowState::WaitingForMediaUpload => {
            FailureOrigin::Media
        }
        WorkflowState::PostExecution => FailureOrigin::Publishing,
        _ => FailureOrigin::Engine,
    }
}

fn failure_notice(error_id: &ErrorId) -> OutboundMessage {
    OutboundMessage::text(format!(
        "⚠️ Something went wrong on our side. Please try again in a moment. Reference: {error_id}"
    ))
}

// ============================================================================
// Builder
// ============================================================================

pub struct WorkflowManagerBuilder<S, E> {
    store: S,
    snapshots: E,
    config: EngineConfig,
    table: DispatchTable,
    templates: TemplateRegistry,
    policy_overrides: HashMap<WorkflowState, HandlerPolicy>,
    captions: Option<Arc<dyn CaptionGenerator>>,
    media: Option<Arc<dyn MediaProvider>>,
    publisher: Option<Arc<dyn Publisher>>,
    clock: Arc<dyn Clock>,
}

impl<S: ContextStore, E: SnapshotStore> WorkflowManagerBuilder<S, E> {
    fn new(store: S, snapshots: E) -> Self {
        Self {
            store,
            snapshots,
            config: EngineConfig::default(),
            table: DispatchTable::standard(),
            templates: TemplateRegistry::builtin(),
            policy_overrides: HashMap::new(),
            captions: None,
            media: None,
            publisher: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dispatch(mut self, table: DispatchTable) -> Self {
        self.table = table;
        self
    }

    pub fn templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Override the policy a handler declares for itself
    pub fn policy(mut self, state: WorkflowState, policy: HandlerPolicy) -> Self {
        self.policy_overrides.insert(state, policy);
        self
    }

    pub fn captions(mut self, captions: Arc<dyn CaptionGenerator>) -> Self {
        self.captions = Some(captions);
        self
    }

    pub fn media(mut self, media: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the handler table, templates and config, then build
    pub fn build(self) -> Result<WorkflowManager<S, E>, ConfigurationError> {
        self.table.validate()?;
        self.templates.validate()?;

        let restart = self.config.restart_state;
        let mut reset = Context::new(self.clock.now());
        reset.state = restart;
        if restart.is_terminal() || reset.check_schema().is_err() {
            return Err(ConfigurationError::InvalidRestartState(restart));
        }

        let captions = self
            .captions
            .ok_or(ConfigurationError::MissingCollaborator("caption generator"))?;
        let media = self
            .media
            .ok_or(ConfigurationError::MissingCollaborator("media provider"))?;
        let publisher = self
            .publisher
            .ok_or(ConfigurationError::MissingCollaborator("publisher"))?;

        let policies = self
            .table
            .iter()
            .map(|handler| {
                let state = handler.state();
                let policy = self
                    .policy_overrides
                    .get(&state)
                    .copied()
                    .unwrap_or_else(|| handler.policy(&self.config));
                (state, policy)
            })
            .collect();

        tracing::info!(
            handlers = self.table.iter().count(),
            restart_state = %restart,
            "Workflow manager ready"
        );

        Ok(WorkflowManager {
            store: self.store,
            recorder: ErrorRecorder::new(self.snapshots, self.config.snapshot_write_timeout),
            deliveries: DeliveryLog::new(self.config.dedup_window, self.config.dedup_capacity),
            table: self.table,
            policies,
            templates: self.templates,
            env: HandlerEnv {
                captions,
                media,
                publisher,
                clock: self.clock,
                config: self.config,
            },
        })
    }
}
