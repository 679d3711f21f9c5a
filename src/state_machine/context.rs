//! Per-client conversational context
//!
//! A context is only ever changed by applying [`ContextUpdate`]s returned from a
//! handler. Each workflow state declares which fields must already be present
//! when a context sits in it; [`Context::check_schema`] enforces that contract
//! at the store boundary.

use super::state::{
    ContentType, MediaItem, MediaSource, Platform, PlatformResult, RenderedAsset, Schedule,
    WorkflowState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Rejected caption variants kept to steer regeneration away from repeats
pub const MAX_REJECTED_CAPTIONS: usize = 5;

/// Conversational state carried between turns for one client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub state: WorkflowState,
    /// Store-assigned revision; 0 means "never committed"
    pub revision: u64,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub platforms: BTreeSet<Platform>,
    #[serde(default)]
    pub caption_prompt: Option<String>,
    #[serde(default)]
    pub candidate_caption: Option<String>,
    #[serde(default)]
    pub rejected_captions: Vec<String>,
    #[serde(default)]
    pub approved_caption: Option<String>,
    #[serde(default)]
    pub include_media: Option<bool>,
    #[serde(default)]
    pub media_source: Option<MediaSource>,
    #[serde(default)]
    pub media_options: Vec<MediaItem>,
    #[serde(default)]
    pub selected_media: Option<MediaItem>,
    #[serde(default)]
    pub rendered_asset: Option<RenderedAsset>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub post_results: Vec<PlatformResult>,
}

/// A single typed mutation of a [`Context`]
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    SetContentType(ContentType),
    SetPlatforms(BTreeSet<Platform>),
    SetCaptionPrompt(String),
    SetCandidate(String),
    /// Move the current candidate into the rejected history
    RejectCandidate,
    /// Promote the current candidate to the approved caption
    ApproveCandidate,
    SetIncludeMedia(bool),
    SetMediaSource(MediaSource),
    SetMediaOptions(Vec<MediaItem>),
    SelectMedia(MediaItem),
    SetRenderedAsset(RenderedAsset),
    ClearMedia,
    SetSchedule(Schedule),
    SetPostResults(Vec<PlatformResult>),
    /// Drop every collected field, keeping identity and revision
    Reset,
}

/// A context that does not carry the fields its state requires
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("context in {state} is missing {missing}")]
pub struct SchemaViolation {
    pub state: WorkflowState,
    pub missing: &'static str,
}

impl Context {
    /// Fresh `Init` context for a client with no prior conversation
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: WorkflowState::Init,
            revision: 0,
            updated_at: now,
            content_type: None,
            platforms: BTreeSet::new(),
            caption_prompt: None,
            candidate_caption: None,
            rejected_captions: Vec::new(),
            approved_caption: None,
            include_media: None,
            media_source: None,
            media_options: Vec::new(),
            selected_media: None,
            rendered_asset: None,
            schedule: None,
            post_results: Vec::new(),
        }
    }

    pub fn apply(&mut self, update: ContextUpdate) {
        match update {
            ContextUpdate::SetContentType(ct) => self.content_type = Some(ct),
            ContextUpdate::SetPlatforms(platforms) => self.platforms = platforms,
            ContextUpdate::SetCaptionPrompt(prompt) => self.caption_prompt = Some(prompt),
            ContextUpdate::SetCandidate(caption) => self.candidate_caption = Some(caption),
            ContextUpdate::RejectCandidate => {
                if let Some(rejected) = self.candidate_caption.take() {
                    self.rejected_captions.push(rejected);
                    let overflow = self
                        .rejected_captions
                        .len()
                        .saturating_sub(MAX_REJECTED_CAPTIONS);
                    self.rejected_captions.drain(..overflow);
                }
            }
            ContextUpdate::ApproveCandidate => {
                if let Some(caption) = self.candidate_caption.take() {
                    self.approved_caption = Some(caption);
                }
            }
            ContextUpdate::SetIncludeMedia(include) => self.include_media = Some(include),
            ContextUpdate::SetMediaSource(source) => self.media_source = Some(source),
            ContextUpdate::SetMediaOptions(options) => self.media_options = options,
            ContextUpdate::SelectMedia(item) => self.selected_media = Some(item),
            ContextUpdate::SetRenderedAsset(asset) => self.rendered_asset = Some(asset),
            ContextUpdate::ClearMedia => {
                self.media_source = None;
                self.media_options.clear();
                self.selected_media = None;
                self.rendered_asset = None;
            }
            ContextUpdate::SetSchedule(schedule) => self.schedule = Some(schedule),
            ContextUpdate::SetPostResults(results) => self.post_results = results,
            ContextUpdate::Reset => {
                let keep_revision = self.revision;
                let keep_state = self.state;
                *self = Context::new(self.updated_at);
                self.revision = keep_revision;
                self.state = keep_state;
            }
        }
    }

    /// Produce the successor context for a committed transition.
    ///
    /// The revision is left untouched; the store assigns the next one.
    pub fn advanced(
        &self,
        next_state: WorkflowState,
        updates: impl IntoIterator<Item = ContextUpdate>,
        now: DateTime<Utc>,
    ) -> Context {
        let mut next = self.clone();
        for update in updates {
            next.apply(update);
        }
        next.state = next_state;
        next.updated_at = now;
        next
    }

    /// Verify that the fields required by the current state are present
    pub fn check_schema(&self) -> Result<(), SchemaViolation> {
        let violation = |missing| {
            Err(SchemaViolation {
                state: self.state,
                missing,
            })
        };

        let needs_type = !matches!(
            self.state,
            WorkflowState::Init | WorkflowState::ContentTypeSelection | WorkflowState::Cancelled
        );
        if needs_type && self.content_type.is_none() {
            return violation("content_type");
        }

        let needs_platforms = needs_type && self.state != WorkflowState::PlatformSelection;
        if needs_platforms && self.platforms.is_empty() {
            return violation("platforms");
        }

        match self.state {
            WorkflowState::CaptionGeneration if self.caption_prompt.is_none() => {
                violation("caption_prompt")
            }
            WorkflowState::ImageInclusionDecision
            | WorkflowState::MediaSourceSelection
            | WorkflowState::ScheduleSelection
                if self.approved_caption.is_none() =>
            {
                violation("approved_caption")
            }
            WorkflowState::WaitingForMediaUpload
                if self.media_source != Some(MediaSource::Upload) =>
            {
                violation("media_source=upload")
            }
            WorkflowState::Confirmation | WorkflowState::PostExecution
                if self.approved_caption.is_none() =>
            {
                violation("approved_caption")
            }
            WorkflowState::Confirmation | WorkflowState::PostExecution
                if self.schedule.is_none() =>
            {
                violation("schedule")
            }
            _ => Ok(()),
        }
    }

    /// Caption text that will be published
    pub fn final_caption(&self) -> Option<&str> {
        self.approved_caption.as_deref()
    }

    pub fn platform_list(&self) -> String {
        self.platforms
            .iter()
            .map(|p| p.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
