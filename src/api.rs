//! HTTP API for postflow
//!
//! Inbound webhook, a synchronous message endpoint and read access to
//! error snapshots and client state.

mod handlers;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::runtime::{Transport, WorkflowManager};
use crate::snapshots::SnapshotStore;
use crate::store::ContextStore;
use std::sync::Arc;

/// The manager as the server runs it, with store types erased
pub type Engine = WorkflowManager<Arc<dyn ContextStore>, Arc<dyn SnapshotStore>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Where replies to webhook events are sent
    pub transport: Arc<dyn Transport>,
}

impl AppState {
    pub fn new(engine: Engine, transport: Arc<dyn Transport>) -> Self {
        Self {
            engine: Arc::new(engine),
            transport,
        }
    }
}
