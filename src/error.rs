//! Startup configuration errors

use crate::state_machine::WorkflowState;
use thiserror::Error;

/// A dispatch table or template set that cannot drive the workflow.
///
/// Raised while building the manager, never at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no handler registered for state {0}")]
    MissingHandler(WorkflowState),
    #[error("more than one handler registered for state {0}")]
    DuplicateHandler(WorkflowState),
    #[error("handler registered for state {0}, which never runs one")]
    UnexpectedHandler(WorkflowState),
    #[error("no template resolves for state {0}")]
    MissingTemplate(WorkflowState),
    #[error("{count} templates resolve for state {state}")]
    AmbiguousTemplate { state: WorkflowState, count: usize },
    #[error("template {name} uses unknown placeholder {{{placeholder}}}")]
    UnknownPlaceholder { name: String, placeholder: String },
    #[error("template {name} has an unterminated placeholder")]
    UnterminatedPlaceholder { name: String },
    #[error("no {0} configured")]
    MissingCollaborator(&'static str),
    #[error("restart state {0} cannot hold a freshly reset context")]
    InvalidRestartState(WorkflowState),
}
