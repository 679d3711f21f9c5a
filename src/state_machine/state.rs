//! Workflow states and the domain vocabulary collected along the way

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Workflow State
// ============================================================================

/// The discrete stage a client's conversation currently occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    /// Entry state, waiting for a greeting
    #[default]
    Init,
    ContentTypeSelection,
    PlatformSelection,
    CaptionInput,
    CaptionGeneration,
    MediaSourceSelection,
    WaitingForMediaUpload,
    ImageInclusionDecision,
    ScheduleSelection,
    Confirmation,
    /// Terminal success state
    PostExecution,
    /// Terminal cancellation state
    Cancelled,
}

impl WorkflowState {
    /// Every state, in workflow order
    pub const ALL: [WorkflowState; 12] = [
        WorkflowState::Init,
        WorkflowState::ContentTypeSelection,
        WorkflowState::PlatformSelection,
        WorkflowState::CaptionInput,
        WorkflowState::CaptionGeneration,
        WorkflowState::MediaSourceSelection,
        WorkflowState::WaitingForMediaUpload,
        WorkflowState::ImageInclusionDecision,
        WorkflowState::ScheduleSelection,
        WorkflowState::Confirmation,
        WorkflowState::PostExecution,
        WorkflowState::Cancelled,
    ];

    /// Terminal states cannot transition out; reaching one makes the context
    /// eligible for archival.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::PostExecution | WorkflowState::Cancelled)
    }

    /// Whether a handler must be registered for this state.
    ///
    /// `PostExecution` is terminal but still runs its handler once on entry.
    pub fn requires_handler(self) -> bool {
        self != WorkflowState::Cancelled
    }

    /// Whether entering this state renders a template prompt.
    ///
    /// `PostExecution` speaks through its per-platform summary instead.
    pub fn produces_output(self) -> bool {
        self != WorkflowState::PostExecution
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Init => "INIT",
            WorkflowState::ContentTypeSelection => "CONTENT_TYPE_SELECTION",
            WorkflowState::PlatformSelection => "PLATFORM_SELECTION",
            WorkflowState::CaptionInput => "CAPTION_INPUT",
            WorkflowState::CaptionGeneration => "CAPTION_GENERATION",
            WorkflowState::MediaSourceSelection => "MEDIA_SOURCE_SELECTION",
            WorkflowState::WaitingForMediaUpload => "WAITING_FOR_MEDIA_UPLOAD",
            WorkflowState::ImageInclusionDecision => "IMAGE_INCLUSION_DECISION",
            WorkflowState::ScheduleSelection => "SCHEDULE_SELECTION",
            WorkflowState::Confirmation => "CONFIRMATION",
            WorkflowState::PostExecution => "POST_EXECUTION",
            WorkflowState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        WorkflowState::ALL
            .into_iter()
            .find(|state| state.as_str() == normalized)
            .ok_or_else(|| format!("unknown workflow state: {s}"))
    }
}

// ============================================================================
// Client Identifier
// ============================================================================

/// Stable external address of one conversational party (e.g. a phone number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Content Types and Platforms
// ============================================================================

/// Kind of post being created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Events,
    Destination,
    Promo,
    Tips,
    Seasonal,
    Generic,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Events,
        ContentType::Destination,
        ContentType::Promo,
        ContentType::Tips,
        ContentType::Seasonal,
        ContentType::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Events => "events",
            ContentType::Destination => "destination",
            ContentType::Promo => "promo",
            ContentType::Tips => "tips",
            ContentType::Seasonal => "seasonal",
            ContentType::Generic => "generic",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        ContentType::ALL.into_iter().find(|ct| ct.as_str() == input)
    }

    /// Platforms that accept this content type
    pub fn supported_platforms(self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| p.content_types().contains(&self))
            .collect()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Social platform a post can be published to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Linkedin,
    Tiktok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Instagram, Platform::Linkedin, Platform::Tiktok];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Tiktok => "tiktok",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Linkedin => "LinkedIn",
            Platform::Tiktok => "TikTok",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Platform::ALL.into_iter().find(|p| p.as_str() == input)
    }

    pub fn content_types(self) -> &'static [ContentType] {
        match self {
            Platform::Instagram => &[
                ContentType::Events,
                ContentType::Destination,
                ContentType::Promo,
                ContentType::Tips,
                ContentType::Seasonal,
            ],
            Platform::Linkedin => &[ContentType::Events, ContentType::Tips, ContentType::Seasonal],
            Platform::Tiktok => &[ContentType::Generic, ContentType::Promo],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Media
// ============================================================================

/// Where the post's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    Upload,
    Unsplash,
    Pexels,
    Pixabay,
}

impl MediaSource {
    pub const STOCK: [MediaSource; 3] = [MediaSource::Unsplash, MediaSource::Pexels, MediaSource::Pixabay];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaSource::Upload => "upload",
            MediaSource::Unsplash => "unsplash",
            MediaSource::Pexels => "pexels",
            MediaSource::Pixabay => "pixabay",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        [
            MediaSource::Upload,
            MediaSource::Unsplash,
            MediaSource::Pexels,
            MediaSource::Pixabay,
        ]
        .into_iter()
        .find(|s| s.as_str() == input)
    }

    pub fn is_stock(self) -> bool {
        self != MediaSource::Upload
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate or selected media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: MediaSource,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, source: MediaSource) -> Self {
        Self {
            url: url.into(),
            description: None,
            source,
        }
    }
}

/// Caption composed with media, ready to publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedAsset {
    pub url: String,
    pub caption: String,
}

// ============================================================================
// Scheduling and Results
// ============================================================================

/// When the post should go out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    Immediate,
    At { time: chrono::DateTime<chrono::Utc> },
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Immediate => f.write_str("now"),
            Schedule::At { time } => write!(f, "{}", time.format("%Y-%m-%d %H:%M UTC")),
        }
    }
}

/// Outcome of publishing to one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlatformOutcome {
    Published { reference: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResult {
    pub platform: Platform,
    pub outcome: PlatformOutcome,
}

impl PlatformResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PlatformOutcome::Published { .. })
    }
}
