use super::{HandlerEnv, HandlerError, HandlerResult, StateHandler};
use crate::state_machine::{Context, Input, Transition, WorkflowState};
use async_trait::async_trait;

const GREETINGS: &[&str] = &["hi", "hello", "hey", "hii", "start"];

/// Waits for a greeting before starting a new post
pub struct InitHandler;

#[async_trait]
impl StateHandler for InitHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::Init
    }

    async fn handle(&self, _ctx: &Context, input: &Input, _env: &HandlerEnv) -> HandlerResult {
        match input.token() {
            Some(token) if GREETINGS.contains(&token) => {
                Ok(Transition::to(WorkflowState::ContentTypeSelection))
            }
            _ => Err(HandlerError::Unrecognized),
        }
    }
}
