//! Process-local snapshot store, used in tests and when no database is configured

use super::{ErrorId, ErrorSnapshot, SnapshotError, SnapshotQuery, SnapshotResult, SnapshotStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<ErrorId, ErrorSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn insert(&self, snapshot: &ErrorSnapshot) -> SnapshotResult<()> {
        let mut snapshots = self.snapshots.write().await;
        if snapshots.contains_key(&snapshot.error_id) {
            return Err(SnapshotError::Duplicate(snapshot.error_id.clone()));
        }
        snapshots.insert(snapshot.error_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get(&self, id: &ErrorId) -> SnapshotResult<Option<ErrorSnapshot>> {
        Ok(self.snapshots.read().await.get(id).cloned())
    }

    async fn query(&self, query: &SnapshotQuery) -> SnapshotResult<Vec<ErrorSnapshot>> {
        let snapshots = self.snapshots.read().await;
        let mut matching: Vec<ErrorSnapshot> = snapshots
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then_with(|| b.error_id.cmp(&a.error_id))
        });
        matching.truncate(query.effective_limit());
        Ok(matching)
    }

    async fn contains(&self, id: &ErrorId) -> SnapshotResult<bool> {
        Ok(self.snapshots.read().await.contains_key(id))
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SnapshotResult<usize> {
        let mut snapshots = self.snapshots.write().await;
        let before = snapshots.len();
        snapshots.retain(|_, s| s.recorded_at >= cutoff);
        Ok(before - snapshots.len())
    }
}
