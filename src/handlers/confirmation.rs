use super::{HandlerEnv, HandlerError, HandlerResult, StateHandler};
use crate::state_machine::{
    Context, ContextUpdate, Input, OutboundMessage, Transition, WorkflowState,
};
use async_trait::async_trait;

/// Final yes/no on the summarized post
pub struct ConfirmationHandler;

#[async_trait]
impl StateHandler for ConfirmationHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::Confirmation
    }

    async fn handle(&self, _ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        if input.is_affirmative() {
            Ok(Transition::to(WorkflowState::PostExecution).chained())
        } else if input.is_negative() {
            Ok(Transition::to(env.config.restart_state)
                .with_update(ContextUpdate::Reset)
                .with_message(OutboundMessage::text("No problem, let's start over.")))
        } else if input.is_cancel() {
            Ok(Transition::to(WorkflowState::Cancelled))
        } else {
            Err(HandlerError::Unrecognized)
        }
    }
}
