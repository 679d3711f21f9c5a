//! Per-client context storage with compare-and-set commits
//!
//! The store holds no business logic. It hands out snapshots of a client's
//! context and accepts a replacement only when the caller proves it saw the
//! latest revision. Revisions come from one store-wide counter so a client's
//! observed revisions keep increasing even after its context is deleted and
//! created again.

mod delivery;

pub use delivery::DeliveryLog;

use crate::state_machine::{ClientId, Context, SchemaViolation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("context rejected: {0}")]
    Schema(#[from] SchemaViolation),
    #[error("context store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a compare-and-set attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    Committed { revision: u64 },
    /// Someone else committed first; nothing was written
    Conflict { current_revision: u64 },
}

/// Storage for per-client conversation context
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Current context, or a fresh `Init` context (revision 0) when absent
    async fn get(&self, client: &ClientId) -> StoreResult<Context>;

    /// Replace the context if its stored revision still equals `expected_revision`
    async fn compare_and_set(
        &self,
        client: &ClientId,
        expected_revision: u64,
        context: Context,
    ) -> StoreResult<CasOutcome>;

    async fn delete(&self, client: &ClientId) -> StoreResult<()>;

    /// Delete contexts last updated before `cutoff`, returning their owners
    async fn expire_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ClientId>>;

    async fn len(&self) -> usize;
}

#[derive(Default)]
struct Contexts {
    by_client: HashMap<ClientId, Context>,
    last_revision: u64,
}

/// Process-local context store
#[derive(Default)]
pub struct InMemoryContextStore {
    inner: RwLock<Contexts>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn get(&self, client: &ClientId) -> StoreResult<Context> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_client
            .get(client)
            .cloned()
            .unwrap_or_else(|| Context::new(Utc::now())))
    }

    async fn compare_and_set(
        &self,
        client: &ClientId,
        expected_revision: u64,
        mut context: Context,
    ) -> StoreResult<CasOutcome> {
        context.check_schema()?;

        let mut inner = self.inner.write().await;
        let current_revision = inner.by_client.get(client).map_or(0, |c| c.revision);
        if current_revision != expected_revision {
            return Ok(CasOutcome::Conflict { current_revision });
        }

        inner.last_revision += 1;
        let revision = inner.last_revision;
        context.revision = revision;
        inner.by_client.insert(client.clone(), context);
        Ok(CasOutcome::Committed { revision })
    }

    async fn delete(&self, client: &ClientId) -> StoreResult<()> {
        self.inner.write().await.by_client.remove(client);
        Ok(())
    }

    async fn expire_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ClientId>> {
        let mut inner = self.inner.write().await;
        let expired: Vec<ClientId> = inner
            .by_client
            .iter()
            .filter(|(_, ctx)| ctx.updated_at < cutoff)
            .map(|(client, _)| client.clone())
            .collect();
        for client in &expired {
            inner.by_client.remove(client);
        }
        Ok(expired)
    }

    async fn len(&self) -> usize {
        self.inner.read().await.by_client.len()
    }
}

#[async_trait]
impl<T: ContextStore + ?Sized> ContextStore for std::sync::Arc<T> {
    async fn get(&self, client: &ClientId) -> StoreResult<Context> {
        (**self).get(client).await
    }

    async fn compare_and_set(
        &self,
        client: &ClientId,
        expected_revision: u64,
        context: Context,
    ) -> StoreResult<CasOutcome> {
        (**self)
            .compare_and_set(client, expected_revision, context)
            .await
    }

    async fn delete(&self, client: &ClientId) -> StoreResult<()> {
        (**self).delete(client).await
    }

    async fn expire_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<ClientId>> {
        (**self).expire_idle(cutoff).await
    }

    async fn len(&self) -> usize {
        (**self).len().await
    }
}
