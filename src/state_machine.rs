//! Conversation workflow state machine
//!
//! Data types only: states, per-client context, inbound input, outbound
//! messages and the transition value handlers return. Dispatch lives in
//! `runtime`, state logic in `handlers`.

pub mod context;
pub mod effect;
pub mod event;
pub mod state;
pub mod transition;

#[cfg(test)]
mod proptests;

pub use context::{Context, ContextUpdate, SchemaViolation, MAX_REJECTED_CAPTIONS};
pub use effect::{Button, OutboundMessage};
pub use event::{InboundEvent, Input, Payload};
pub use state::{
    ClientId, ContentType, MediaItem, MediaSource, Platform, PlatformOutcome, PlatformResult,
    RenderedAsset, Schedule, WorkflowState,
};
pub use transition::Transition;
