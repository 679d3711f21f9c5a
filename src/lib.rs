//! postflow - conversational workflow engine for social post creation
//!
//! A client moves through a fixed set of states (content type, platforms,
//! caption, media, schedule, confirmation) one inbound message at a time.
//! Per-client context is committed with compare-and-set; failures are kept
//! as error snapshots addressable by a short id.

pub mod adapters;
pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod runtime;
pub mod snapshots;
pub mod state_machine;
pub mod store;
pub mod templates;

pub use config::{EngineConfig, ProviderConfig, ServerConfig};
pub use error::ConfigurationError;
pub use runtime::{Disposition, ProcessOutcome, WorkflowManager};
