//! Dry-run publishing and delivery, plus timing wrappers for collaborators

use crate::runtime::{
    CaptionGenerator, CaptionRequest, CollaboratorError, MediaProvider, PostAsset, PublishReceipt,
    Publisher, Transport,
};
use crate::state_machine::{ClientId, MediaItem, MediaSource, OutboundMessage, Platform, RenderedAsset, Schedule};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Publisher that logs the post instead of sending it anywhere
#[derive(Debug, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl Publisher for LoggingPublisher {
    async fn publish(
        &self,
        platform: Platform,
        asset: &PostAsset,
        schedule: &Schedule,
    ) -> Result<PublishReceipt, CollaboratorError> {
        let reference = format!("dry-run-{}-{}", platform.as_str(), uuid::Uuid::new_v4().simple());
        tracing::info!(
            platform = platform.as_str(),
            schedule = %schedule,
            caption_len = asset.caption.len(),
            media = asset.media_url.as_deref().unwrap_or("none"),
            reference = %reference,
            "Dry-run publish"
        );
        Ok(PublishReceipt { reference })
    }
}

/// Transport that logs outbound messages
#[derive(Debug, Default)]
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn deliver(
        &self,
        client: &ClientId,
        messages: &[OutboundMessage],
    ) -> Result<(), CollaboratorError> {
        for message in messages {
            let kind = match message {
                OutboundMessage::Text { .. } => "text",
                OutboundMessage::Buttons { .. } => "buttons",
                OutboundMessage::Media { .. } => "media",
            };
            tracing::info!(client_id = %client, kind, body = message.body(), "Outbound message");
        }
        Ok(())
    }
}

/// Wrapper that logs duration and outcome of every generation
pub struct LoggingCaptionGenerator {
    inner: Arc<dyn CaptionGenerator>,
}

impl LoggingCaptionGenerator {
    pub fn new(inner: Arc<dyn CaptionGenerator>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CaptionGenerator for LoggingCaptionGenerator {
    async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, CollaboratorError> {
        let start = Instant::now();
        let result = self.inner.generate_caption(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(caption) => {
                tracing::info!(
                    content_type = %request.content_type,
                    rejected = request.rejected.len(),
                    duration_ms = %duration.as_millis(),
                    caption_len = caption.len(),
                    "Caption generated"
                );
            }
            Err(e) => {
                tracing::error!(
                    content_type = %request.content_type,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Caption generation failed"
                );
            }
        }

        result
    }
}

/// Wrapper that logs duration and outcome of media calls
pub struct LoggingMediaProvider {
    inner: Arc<dyn MediaProvider>,
}

impl LoggingMediaProvider {
    pub fn new(inner: Arc<dyn MediaProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MediaProvider for LoggingMediaProvider {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError> {
        let start = Instant::now();
        let result = self.inner.search_media(query, source).await;
        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(items) => tracing::info!(source = %source, duration_ms = %duration_ms, results = items.len(), "Media search completed"),
            Err(e) => tracing::error!(source = %source, duration_ms = %duration_ms, error = %e.message, "Media search failed"),
        }
        result
    }

    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        let start = Instant::now();
        let result = self.inner.render_canvas(caption, media).await;
        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(_) => tracing::info!(source = %media.source, duration_ms = %duration_ms, "Canvas rendered"),
            Err(e) => tracing::error!(source = %media.source, duration_ms = %duration_ms, error = %e.message, "Canvas rendering failed"),
        }
        result
    }
}
