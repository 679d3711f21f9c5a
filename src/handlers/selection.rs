//! Content type and platform selection

use super::{HandlerEnv, HandlerError, HandlerResult, StateHandler};
use crate::state_machine::{
    ContentType, Context, ContextUpdate, Input, Platform, Transition, WorkflowState,
};
use async_trait::async_trait;
use std::collections::BTreeSet;

pub struct ContentTypeHandler;

#[async_trait]
impl StateHandler for ContentTypeHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::ContentTypeSelection
    }

    async fn handle(&self, _ctx: &Context, input: &Input, _env: &HandlerEnv) -> HandlerResult {
        let Some(content_type) = input.token().and_then(ContentType::parse) else {
            let options: Vec<_> = ContentType::ALL.iter().map(|c| c.as_str()).collect();
            return Err(HandlerError::invalid(format!(
                "Please choose one of: {}.",
                options.join(", ")
            )));
        };

        if content_type.supported_platforms().is_empty() {
            return Err(HandlerError::invalid(format!(
                "No platform currently accepts {content_type} posts. Please pick another type."
            )));
        }

        Ok(Transition::to(WorkflowState::PlatformSelection)
            .with_update(ContextUpdate::SetContentType(content_type)))
    }
}

pub struct PlatformHandler;

#[async_trait]
impl StateHandler for PlatformHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::PlatformSelection
    }

    async fn handle(&self, ctx: &Context, input: &Input, _env: &HandlerEnv) -> HandlerResult {
        let content_type = ctx
            .content_type
            .ok_or_else(|| HandlerError::Internal("platform selection without content type".into()))?;
        let supported = content_type.supported_platforms();
        let Some(token) = input.token() else {
            return Err(HandlerError::Unrecognized);
        };

        let chosen: BTreeSet<Platform> = if matches!(token, "all" | "all platforms") {
            supported.iter().copied().collect()
        } else {
            let mut chosen = BTreeSet::new();
            for name in token.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let Some(platform) = Platform::parse(name) else {
                    return Err(HandlerError::invalid(format!(
                        "I don't know the platform '{name}'."
                    )));
                };
                if !supported.contains(&platform) {
                    let names: Vec<_> = supported.iter().map(|p| p.display_name()).collect();
                    return Err(HandlerError::invalid(format!(
                        "{platform} doesn't support {content_type} content. Choose from: {}.",
                        names.join(", ")
                    )));
                }
                chosen.insert(platform);
            }
            chosen
        };

        if chosen.is_empty() {
            return Err(HandlerError::Unrecognized);
        }

        Ok(Transition::to(WorkflowState::CaptionInput)
            .with_update(ContextUpdate::SetPlatforms(chosen)))
    }
}
