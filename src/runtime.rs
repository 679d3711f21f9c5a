//! Runtime for driving client conversations
//!
//! The manager owns dispatch, retries, deduplication and failure recording;
//! collaborators are reached only through the traits in [`traits`].

mod manager;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use manager::{
    Disposition, ProcessOutcome, SweepReport, WorkflowManager, WorkflowManagerBuilder,
};
pub use traits::*;
