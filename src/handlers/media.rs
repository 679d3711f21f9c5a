//! Image inclusion, source selection and upload

use super::{HandlerEnv, HandlerError, HandlerPolicy, HandlerResult, StateHandler};
use crate::config::EngineConfig;
use crate::state_machine::{
    Context, ContextUpdate, Input, MediaItem, MediaSource, OutboundMessage, Transition,
    WorkflowState,
};
use async_trait::async_trait;

/// Search results offered to the user at once
pub const MAX_MEDIA_OPTIONS: usize = 5;

pub struct ImageInclusionHandler;

#[async_trait]
impl StateHandler for ImageInclusionHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::ImageInclusionDecision
    }

    async fn handle(&self, _ctx: &Context, input: &Input, _env: &HandlerEnv) -> HandlerResult {
        if input.is_affirmative() {
            Ok(Transition::to(WorkflowState::MediaSourceSelection)
                .with_update(ContextUpdate::SetIncludeMedia(true)))
        } else if input.is_negative() {
            Ok(Transition::to(WorkflowState::ScheduleSelection)
                .with_update(ContextUpdate::SetIncludeMedia(false))
                .with_update(ContextUpdate::ClearMedia))
        } else {
            Err(HandlerError::Unrecognized)
        }
    }
}

/// Picks upload or a stock library, then one of the search results
pub struct MediaSourceHandler;

impl MediaSourceHandler {
    async fn search(ctx: &Context, source: MediaSource, env: &HandlerEnv) -> HandlerResult {
        let query = ctx
            .caption_prompt
            .clone()
            .or_else(|| ctx.content_type.map(|c| c.as_str().to_string()))
            .unwrap_or_default();

        let mut items = env
            .media
            .search_media(&query, source)
            .await
            .map_err(HandlerError::media)?;
        if items.is_empty() {
            return Err(HandlerError::invalid(format!(
                "No images found on {source}. Try another source."
            )));
        }
        items.truncate(MAX_MEDIA_OPTIONS);

        let previews = items.iter().enumerate().map(|(i, item)| {
            let label = item.description.as_deref().unwrap_or("");
            OutboundMessage::media(item.url.clone(), Some(format!("{}. {label}", i + 1)))
        });
        let mut transition = Transition::stay(WorkflowState::MediaSourceSelection)
            .with_update(ContextUpdate::SetMediaSource(source))
            .with_update(ContextUpdate::SetMediaOptions(items.clone()));
        for preview in previews {
            transition = transition.with_message(preview);
        }
        Ok(transition.with_message(OutboundMessage::text(format!(
            "Reply with a number from 1 to {} to use that image, or pick another source.",
            items.len()
        ))))
    }

    async fn select(ctx: &Context, index: usize, env: &HandlerEnv) -> HandlerResult {
        if ctx.media_options.is_empty() {
            return Err(HandlerError::invalid(
                "Pick a stock library first, then choose an image by number.",
            ));
        }
        let Some(item) = index
            .checked_sub(1)
            .and_then(|i| ctx.media_options.get(i))
        else {
            return Err(HandlerError::invalid(format!(
                "Please reply with a number between 1 and {}.",
                ctx.media_options.len()
            )));
        };
        render_and_continue(ctx, item.clone(), env).await
    }
}

#[async_trait]
impl StateHandler for MediaSourceHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::MediaSourceSelection
    }

    fn policy(&self, config: &EngineConfig) -> HandlerPolicy {
        HandlerPolicy::collaborator(config)
    }

    async fn handle(&self, ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        let Some(token) = input.token() else {
            return Err(HandlerError::Unrecognized);
        };

        if let Ok(index) = token.parse::<usize>() {
            return Self::select(ctx, index, env).await;
        }

        match MediaSource::parse(token) {
            Some(MediaSource::Upload) => Ok(Transition::to(WorkflowState::WaitingForMediaUpload)
                .with_update(ContextUpdate::ClearMedia)
                .with_update(ContextUpdate::SetMediaSource(MediaSource::Upload))),
            Some(source) => Self::search(ctx, source, env).await,
            None => Err(HandlerError::Unrecognized),
        }
    }
}

/// Waits for the user's own image
pub struct MediaUploadHandler;

#[async_trait]
impl StateHandler for MediaUploadHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::WaitingForMediaUpload
    }

    fn policy(&self, config: &EngineConfig) -> HandlerPolicy {
        HandlerPolicy::collaborator(config)
    }

    async fn handle(&self, ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        match input {
            Input::Media { url, mime_type } if mime_type.starts_with("image/") => {
                render_and_continue(ctx, MediaItem::new(url.clone(), MediaSource::Upload), env)
                    .await
            }
            Input::Media { .. } => Err(HandlerError::invalid(
                "That file isn't an image. Please upload a photo or graphic.",
            )),
            _ if input.token() == Some("back") => {
                Ok(Transition::to(WorkflowState::MediaSourceSelection)
                    .with_update(ContextUpdate::ClearMedia))
            }
            _ => Err(HandlerError::Unrecognized),
        }
    }
}

/// Compose the approved caption with `item` and move on to scheduling
async fn render_and_continue(ctx: &Context, item: MediaItem, env: &HandlerEnv) -> HandlerResult {
    let caption = ctx
        .final_caption()
        .ok_or_else(|| HandlerError::Internal("media selected without approved caption".into()))?;
    let asset = env
        .media
        .render_canvas(caption, &item)
        .await
        .map_err(HandlerError::media)?;

    Ok(Transition::to(WorkflowState::ScheduleSelection)
        .with_message(OutboundMessage::media(
            asset.url.clone(),
            Some("Here's how your post will look.".into()),
        ))
        .with_update(ContextUpdate::SelectMedia(item))
        .with_update(ContextUpdate::SetRenderedAsset(asset)))
}
