//! State handlers and the dispatch table
//!
//! A handler owns the logic of exactly one workflow state. It sees a snapshot
//! of the client's context and the normalized input, may call collaborators
//! through [`HandlerEnv`], and answers with a [`Transition`] for the manager
//! to commit. Handlers never touch the stores.

mod caption;
mod confirmation;
mod execution;
mod init;
mod media;
mod schedule;
mod selection;

pub use caption::{CaptionGenerationHandler, CaptionInputHandler};
pub use confirmation::ConfirmationHandler;
pub use execution::PostExecutionHandler;
pub use init::InitHandler;
pub use media::{ImageInclusionHandler, MediaSourceHandler, MediaUploadHandler, MAX_MEDIA_OPTIONS};
pub use schedule::{resolve_schedule, ScheduleHandler};
pub use selection::{ContentTypeHandler, PlatformHandler};

use crate::config::EngineConfig;
use crate::error::ConfigurationError;
use crate::runtime::traits::{CaptionGenerator, Clock, CollaboratorError, MediaProvider, Publisher};
use crate::snapshots::FailureOrigin;
use crate::state_machine::{Context, Input, Transition, WorkflowState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Time budget and conflict handling for one handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerPolicy {
    pub timeout: Duration,
    /// Re-runs allowed after losing a compare-and-set in the same state
    pub conflict_retries: u32,
}

impl HandlerPolicy {
    /// In-process handlers
    pub fn fast(config: &EngineConfig) -> Self {
        Self {
            timeout: config.handler_timeout,
            conflict_retries: 1,
        }
    }

    /// Handlers that wait on generation or media collaborators
    pub fn collaborator(config: &EngineConfig) -> Self {
        Self {
            timeout: config.collaborator_timeout,
            conflict_retries: 1,
        }
    }

    /// Publishing must not run twice, so a lost commit is never retried.
    /// Each platform call is bounded separately; this covers all of them.
    pub fn publishing(config: &EngineConfig) -> Self {
        Self {
            timeout: config.publish_timeout + config.handler_timeout,
            conflict_retries: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Input the state cannot use; the message is shown to the user
    #[error("{0}")]
    Validation(String),
    /// Input the state does not understand at all; only the prompt is repeated
    #[error("unrecognized input")]
    Unrecognized,
    #[error("{origin:?} collaborator failed: {source}")]
    Collaborator {
        origin: FailureOrigin,
        #[source]
        source: CollaboratorError,
    },
    #[error("internal handler error: {0}")]
    Internal(String),
}

impl HandlerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn generation(source: CollaboratorError) -> Self {
        Self::Collaborator {
            origin: FailureOrigin::Generation,
            source,
        }
    }

    pub fn media(source: CollaboratorError) -> Self {
        Self::Collaborator {
            origin: FailureOrigin::Media,
            source,
        }
    }
}

pub type HandlerResult = Result<Transition, HandlerError>;

/// Read-only services handed to every handler
pub struct HandlerEnv {
    pub captions: Arc<dyn CaptionGenerator>,
    pub media: Arc<dyn MediaProvider>,
    pub publisher: Arc<dyn Publisher>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

/// Logic for one workflow state
#[async_trait]
pub trait StateHandler: Send + Sync {
    fn state(&self) -> WorkflowState;

    fn policy(&self, config: &EngineConfig) -> HandlerPolicy {
        HandlerPolicy::fast(config)
    }

    async fn handle(&self, ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult;
}

/// Mapping from state to the handler that owns it
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: Vec<Arc<dyn StateHandler>>,
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// One handler for every state that needs one
    pub fn standard() -> Self {
        Self::empty()
            .with_handler(InitHandler)
            .with_handler(ContentTypeHandler)
            .with_handler(PlatformHandler)
            .with_handler(CaptionInputHandler)
            .with_handler(CaptionGenerationHandler)
            .with_handler(ImageInclusionHandler)
            .with_handler(MediaSourceHandler)
            .with_handler(MediaUploadHandler)
            .with_handler(ScheduleHandler)
            .with_handler(ConfirmationHandler)
            .with_handler(PostExecutionHandler)
    }

    pub fn with_handler(mut self, handler: impl StateHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Replace whatever handles `handler.state()` with `handler`
    pub fn override_handler(mut self, handler: impl StateHandler + 'static) -> Self {
        let state = handler.state();
        self.handlers.retain(|h| h.state() != state);
        self.with_handler(handler)
    }

    /// Every state that runs a handler has exactly one; no other state has any
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut counts: HashMap<WorkflowState, usize> = HashMap::new();
        for handler in &self.handlers {
            *counts.entry(handler.state()).or_default() += 1;
        }

        for state in WorkflowState::ALL {
            let count = counts.get(&state).copied().unwrap_or(0);
            match (state.requires_handler(), count) {
                (true, 0) => return Err(ConfigurationError::MissingHandler(state)),
                (true, 1) | (false, 0) => {}
                (true, _) => return Err(ConfigurationError::DuplicateHandler(state)),
                (false, _) => return Err(ConfigurationError::UnexpectedHandler(state)),
            }
        }
        Ok(())
    }

    pub fn get(&self, state: WorkflowState) -> Option<&Arc<dyn StateHandler>> {
        self.handlers.iter().find(|h| h.state() == state)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn StateHandler>> {
        self.handlers.iter()
    }
}
