//! Caption prompt collection and the generate/approve loop

use super::{HandlerEnv, HandlerError, HandlerPolicy, HandlerResult, StateHandler};
use crate::config::EngineConfig;
use crate::runtime::traits::{CaptionRequest, CollaboratorError};
use crate::state_machine::{Context, ContextUpdate, Input, Transition, WorkflowState};
use async_trait::async_trait;

/// Takes the user's own description of the post
pub struct CaptionInputHandler;

#[async_trait]
impl StateHandler for CaptionInputHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::CaptionInput
    }

    async fn handle(&self, _ctx: &Context, input: &Input, _env: &HandlerEnv) -> HandlerResult {
        let Input::Text { raw, .. } = input else {
            return Err(HandlerError::invalid(
                "Please describe your post in a text message.",
            ));
        };
        let prompt = raw.trim();
        if prompt.is_empty() {
            return Err(HandlerError::Unrecognized);
        }

        Ok(Transition::to(WorkflowState::CaptionGeneration)
            .with_update(ContextUpdate::SetCaptionPrompt(prompt.to_string()))
            .chained())
    }
}

/// Generates caption variants until the user approves one
pub struct CaptionGenerationHandler;

impl CaptionGenerationHandler {
    async fn generate(
        ctx: &Context,
        rejected: Vec<String>,
        env: &HandlerEnv,
    ) -> Result<String, HandlerError> {
        let (Some(content_type), Some(prompt)) = (ctx.content_type, ctx.caption_prompt.clone())
        else {
            return Err(HandlerError::Internal(
                "caption generation without content type or prompt".into(),
            ));
        };

        let request = CaptionRequest {
            content_type,
            prompt,
            rejected,
        };
        let caption = env
            .captions
            .generate_caption(&request)
            .await
            .map_err(HandlerError::generation)?;
        let caption = caption.trim().to_string();

        if caption.is_empty() {
            return Err(HandlerError::generation(CollaboratorError::unknown(
                "generator returned an empty caption",
            )));
        }
        if request.rejected.iter().any(|r| r.trim() == caption) {
            return Err(HandlerError::generation(CollaboratorError::unknown(
                "generator repeated a rejected caption",
            )));
        }
        Ok(caption)
    }
}

#[async_trait]
impl StateHandler for CaptionGenerationHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::CaptionGeneration
    }

    fn policy(&self, config: &EngineConfig) -> HandlerPolicy {
        HandlerPolicy::collaborator(config)
    }

    async fn handle(&self, ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        let candidate = ctx.candidate_caption.as_ref();

        match candidate {
            Some(_) if input.is_affirmative() => Ok(Transition::to(
                WorkflowState::ImageInclusionDecision,
            )
            .with_update(ContextUpdate::ApproveCandidate)),

            Some(current) if input.is_negative() => {
                let mut rejected = ctx.rejected_captions.clone();
                rejected.push(current.clone());
                let caption = Self::generate(ctx, rejected, env).await?;
                Ok(Transition::stay(WorkflowState::CaptionGeneration)
                    .with_update(ContextUpdate::RejectCandidate)
                    .with_update(ContextUpdate::SetCandidate(caption))
                    .with_prompt())
            }

            Some(_) if *input != Input::Enter => Err(HandlerError::invalid(
                "Reply 'y' to use this caption or 'n' for a new variation.",
            )),

            _ => {
                let caption = Self::generate(ctx, ctx.rejected_captions.clone(), env).await?;
                Ok(Transition::stay(WorkflowState::CaptionGeneration)
                    .with_update(ContextUpdate::SetCandidate(caption))
                    .with_prompt())
            }
        }
    }
}
