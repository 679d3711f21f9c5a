//! Error snapshots: immutable forensic records of workflow failures
//!
//! Every user-visible failure carries the id of a snapshot holding the full
//! context at the moment things went wrong. Snapshots are diagnostics, kept
//! for a retention window and then purged.

mod error_id;
mod memory;
mod sqlite;

pub use error_id::ErrorId;
pub use memory::InMemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use crate::state_machine::{ClientId, Context, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Category of a failure, deciding how the engine reacts to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unusable input; re-prompt, never snapshotted
    ValidationFailure,
    /// A collaborator errored or timed out; state unchanged
    CollaboratorFailure,
    /// Startup misconfiguration
    ConfigurationFailure,
    /// Compare-and-set lost after retrying
    ConcurrencyConflict,
    /// Some platforms failed to publish while others succeeded
    PartialExecutionFailure,
    /// Store or schema failure inside the engine
    InternalFailure,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::ValidationFailure,
        FailureKind::CollaboratorFailure,
        FailureKind::ConfigurationFailure,
        FailureKind::ConcurrencyConflict,
        FailureKind::PartialExecutionFailure,
        FailureKind::InternalFailure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ValidationFailure => "validation_failure",
            FailureKind::CollaboratorFailure => "collaborator_failure",
            FailureKind::ConfigurationFailure => "configuration_failure",
            FailureKind::ConcurrencyConflict => "concurrency_conflict",
            FailureKind::PartialExecutionFailure => "partial_execution_failure",
            FailureKind::InternalFailure => "internal_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown failure kind: {s}"))
    }
}

/// Subsystem a failure came from; decides the error id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    Generation,
    Media,
    Publishing,
    Concurrency,
    Engine,
}

impl FailureOrigin {
    const ALL: [FailureOrigin; 5] = [
        FailureOrigin::Generation,
        FailureOrigin::Media,
        FailureOrigin::Publishing,
        FailureOrigin::Concurrency,
        FailureOrigin::Engine,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            FailureOrigin::Generation => "GEN",
            FailureOrigin::Media => "MED",
            FailureOrigin::Publishing => "PUB",
            FailureOrigin::Concurrency => "CON",
            FailureOrigin::Engine => "ENG",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.prefix() == prefix)
    }
}

/// Immutable record of one failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    pub error_id: ErrorId,
    pub recorded_at: DateTime<Utc>,
    pub client_id: ClientId,
    /// State the client was in when the failure happened
    pub state: WorkflowState,
    pub context: Context,
    pub kind: FailureKind,
    pub origin: FailureOrigin,
    pub message: String,
}

/// A failure as reported by the engine, before an id is assigned
#[derive(Debug, Clone)]
pub struct Failure {
    pub client_id: ClientId,
    pub context: Context,
    pub kind: FailureKind,
    pub origin: FailureOrigin,
    pub message: String,
}

/// Filter for listing snapshots; all fields optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client: Option<ClientId>,
    #[serde(default)]
    pub kind: Option<FailureKind>,
    #[serde(default)]
    pub state: Option<WorkflowState>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SnapshotQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn matches(&self, snapshot: &ErrorSnapshot) -> bool {
        self.since.is_none_or(|since| snapshot.recorded_at >= since)
            && self.until.is_none_or(|until| snapshot.recorded_at <= until)
            && self
                .client
                .as_ref()
                .is_none_or(|client| &snapshot.client_id == client)
            && self.kind.is_none_or(|kind| snapshot.kind == kind)
            && self.state.is_none_or(|state| snapshot.state == state)
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("snapshot {0} already exists")]
    Duplicate(ErrorId),
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Durable storage for error snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a new snapshot; an existing id is never overwritten
    async fn insert(&self, snapshot: &ErrorSnapshot) -> SnapshotResult<()>;

    async fn get(&self, id: &ErrorId) -> SnapshotResult<Option<ErrorSnapshot>>;

    /// Matching snapshots, newest first
    async fn query(&self, query: &SnapshotQuery) -> SnapshotResult<Vec<ErrorSnapshot>>;

    async fn contains(&self, id: &ErrorId) -> SnapshotResult<bool>;

    /// Remove snapshots recorded before `cutoff`; returns how many were removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SnapshotResult<usize>;
}

#[async_trait]
impl<T: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<T> {
    async fn insert(&self, snapshot: &ErrorSnapshot) -> SnapshotResult<()> {
        (**self).insert(snapshot).await
    }

    async fn get(&self, id: &ErrorId) -> SnapshotResult<Option<ErrorSnapshot>> {
        (**self).get(id).await
    }

    async fn query(&self, query: &SnapshotQuery) -> SnapshotResult<Vec<ErrorSnapshot>> {
        (**self).query(query).await
    }

    async fn contains(&self, id: &ErrorId) -> SnapshotResult<bool> {
        (**self).contains(id).await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SnapshotResult<usize> {
        (**self).purge_before(cutoff).await
    }
}

/// Attempts at finding an unused id before accepting a possible collision
const ID_ATTEMPTS: usize = 8;

/// Turns failures into stored snapshots.
///
/// Recording never fails from the caller's point of view: when the store
/// errors or is too slow the snapshot goes to the log instead and the id is
/// still handed out.
pub struct ErrorRecorder<E> {
    store: E,
    write_timeout: Duration,
}

impl<E: SnapshotStore> ErrorRecorder<E> {
    pub fn new(store: E, write_timeout: Duration) -> Self {
        Self {
            store,
            write_timeout,
        }
    }

    pub fn store(&self) -> &E {
        &self.store
    }

    pub async fn record(&self, failure: Failure, now: DateTime<Utc>) -> ErrorId {
        let Failure {
            client_id,
            context,
            kind,
            origin,
            message,
        } = failure;

        let write = async {
            let mut error_id = self.unused_id(origin).await;
            let mut attempts = 1;
            loop {
                let snapshot = ErrorSnapshot {
                    error_id,
                    recorded_at: now,
                    client_id: client_id.clone(),
                    state: context.state,
                    context: context.clone(),
                    kind,
                    origin,
                    message: message.clone(),
                };
                // Another writer can take the id between the check and the insert
                match self.store.insert(&snapshot).await {
                    Err(SnapshotError::Duplicate(_)) if attempts < ID_ATTEMPTS => {
                        attempts += 1;
                        error_id = fresh_id(origin);
                    }
                    result => break (snapshot, result),
                }
            }
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok((snapshot, Ok(()))) => {
                tracing::warn!(
                    error_id = %snapshot.error_id,
                    client_id = %snapshot.client_id,
                    state = %snapshot.state,
                    kind = %snapshot.kind,
                    message = %snapshot.message,
                    "Recorded error snapshot"
                );
                snapshot.error_id
            }
            Ok((mut snapshot, Err(e))) => {
                // Never hand out an id that names someone else's snapshot
                if matches!(e, SnapshotError::Duplicate(_)) {
                    snapshot.error_id = fresh_id(origin);
                }
                log_unstored(&snapshot, &e.to_string());
                snapshot.error_id
            }
            Err(_) => {
                let snapshot = ErrorSnapshot {
                    error_id: fresh_id(origin),
                    recorded_at: now,
                    client_id: client_id.clone(),
                    state: context.state,
                    context: context.clone(),
                    kind,
                    origin,
                    message: message.clone(),
                };
                log_unstored(&snapshot, "snapshot write timed out");
                snapshot.error_id
            }
        }
    }

    async fn unused_id(&self, origin: FailureOrigin) -> ErrorId {
        let mut id = fresh_id(origin);
        for _ in 1..ID_ATTEMPTS {
            match self.store.contains(&id).await {
                Ok(true) => id = fresh_id(origin),
                Ok(false) | Err(_) => break,
            }
        }
        id
    }
}

fn fresh_id(origin: FailureOrigin) -> ErrorId {
    ErrorId::generate(origin, &mut rand::thread_rng())
}

fn log_unstored(snapshot: &ErrorSnapshot, reason: &str) {
    let context = serde_json::to_string(&snapshot.context).unwrap_or_default();
    tracing::error!(
        error_id = %snapshot.error_id,
        client_id = %snapshot.client_id,
        state = %snapshot.state,
        kind = %snapshot.kind,
        origin = snapshot.origin.prefix(),
        message = %snapshot.message,
        context = %context,
        reason,
        "Error snapshot not stored"
    );
}
