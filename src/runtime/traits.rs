//! Trait abstractions for the workflow's collaborators
//!
//! Everything slow or external sits behind one of these traits so the
//! manager can be driven by mocks in tests.

use crate::state_machine::{
    ClientId, ContentType, MediaItem, MediaSource, OutboundMessage, Platform, RenderedAsset,
    Schedule,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Collaborator error with classification
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CollaboratorError {
    pub kind: CollaboratorErrorKind,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: CollaboratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CollaboratorErrorKind::Unknown, message)
    }

    /// Classify an HTTP status from a provider API
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        match status {
            401 | 403 => Self::auth(message),
            429 => Self::rate_limit(message),
            400..=499 => Self::invalid_request(message),
            500..=599 => Self::server_error(message),
            _ => Self::unknown(message),
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorErrorKind {
    /// Network issues, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Authentication failed (401, 403)
    Auth,
    /// Bad request (400)
    InvalidRequest,
    Unknown,
}

impl CollaboratorErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

// ============================================================================
// Requests and Results
// ============================================================================

/// Everything a caption generator gets to work with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRequest {
    pub content_type: ContentType,
    /// The user's own description, as typed
    pub prompt: String,
    /// Variants the user already turned down
    pub rejected: Vec<String>,
}

/// What gets published: final caption and optional rendered media
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostAsset {
    pub caption: String,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Platform-side reference to the created or scheduled post
    pub reference: String,
}

// ============================================================================
// Traits
// ============================================================================

/// Sends messages back to a client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(
        &self,
        client: &ClientId,
        messages: &[OutboundMessage],
    ) -> Result<(), CollaboratorError>;
}

/// Produces caption text
#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate_caption(&self, request: &CaptionRequest)
        -> Result<String, CollaboratorError>;
}

/// Stock media search and caption/media composition
#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError>;

    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError>;
}

/// Posts to one social platform
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        platform: Platform,
        asset: &PostAsset,
        schedule: &Schedule,
    ) -> Result<PublishReceipt, CollaboratorError>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn deliver(
        &self,
        client: &ClientId,
        messages: &[OutboundMessage],
    ) -> Result<(), CollaboratorError> {
        (**self).deliver(client, messages).await
    }
}

#[async_trait]
impl<T: CaptionGenerator + ?Sized> CaptionGenerator for Arc<T> {
    async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, CollaboratorError> {
        (**self).generate_caption(request).await
    }
}

#[async_trait]
impl<T: MediaProvider + ?Sized> MediaProvider for Arc<T> {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError> {
        (**self).search_media(query, source).await
    }

    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        (**self).render_canvas(caption, media).await
    }
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(
        &self,
        platform: Platform,
        asset: &PostAsset,
        schedule: &Schedule,
    ) -> Result<PublishReceipt, CollaboratorError> {
        (**self).publish(platform, asset, schedule).await
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
