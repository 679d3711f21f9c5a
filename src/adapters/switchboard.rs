//! Templated canvas rendering through the Switchboard Canvas API
//!
//! Search is delegated to the wrapped provider. Rendering fills the
//! configured template's text fields with the caption and its image fields
//! with the chosen media, then asks Switchboard for the composed image.
//! Without an API key the wrapped provider renders instead.

use super::{fetch_json, http_client};
use crate::config::ProviderConfig;
use crate::runtime::{CollaboratorError, MediaProvider};
use crate::state_machine::{MediaItem, MediaSource, RenderedAsset};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.canvas.switchboard.ai";
const DEFAULT_TEMPLATE: &str = "postflow_default";

/// Square output every supported platform accepts
const CANVAS_SIZE: CanvasSize = CanvasSize {
    width: 1080,
    height: 1080,
};

pub struct SwitchboardCanvasRenderer<M> {
    inner: M,
    client: Client,
    api_key: Option<String>,
    base_url: String,
    template: String,
}

impl<M: MediaProvider> SwitchboardCanvasRenderer<M> {
    pub fn new(config: &ProviderConfig, inner: M) -> Self {
        Self {
            inner,
            client: http_client(Duration::from_secs(30)),
            api_key: config.switchboard_api_key.clone(),
            base_url: config
                .switchboard_base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            template: config
                .switchboard_template
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn template_fields(&self, key: &str) -> Result<Vec<TemplateField>, CollaboratorError> {
        let elements: TemplateElements = fetch_json(
            self.client
                .get(format!("{}/template/{}/elements", self.base_url, self.template))
                .header("X-API-Key", key),
        )
        .await?;
        Ok(elements.fields)
    }

    async fn render(
        &self,
        key: &str,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        let fields = self.template_fields(key).await?;
        let request = RenderRequest {
            template: &self.template,
            sizes: vec![CANVAS_SIZE],
            elements: fill_elements(&fields, caption, &media.url),
        };
        let response: RenderResponse = fetch_json(
            self.client
                .post(&self.base_url)
                .header("X-API-Key", key)
                .json(&request),
        )
        .await?;

        let url = response
            .sizes
            .into_iter()
            .find_map(|size| size.url.filter(|u| !u.is_empty()))
            .ok_or_else(|| CollaboratorError::unknown("Switchboard returned no rendered image"))?;
        tracing::info!(template = %self.template, url = %url, "Rendered canvas");
        Ok(RenderedAsset {
            url,
            caption: caption.to_string(),
        })
    }
}

/// Element values for each template field this workflow can fill
fn fill_elements(fields: &[TemplateField], caption: &str, image_url: &str) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|field| {
            let value = match field.kind.as_str() {
                "text" => json!({ "text": caption }),
                "image" => json!({ "url": image_url }),
                _ => return None,
            };
            Some((field.name.clone(), value))
        })
        .collect()
}

#[async_trait]
impl<M: MediaProvider> MediaProvider for SwitchboardCanvasRenderer<M> {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError> {
        self.inner.search_media(query, source).await
    }

    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        let Some(key) = self.api_key.as_deref() else {
            return self.inner.render_canvas(caption, media).await;
        };
        if media.url.is_empty() {
            return Err(CollaboratorError::invalid_request("media item has no URL"));
        }
        self.render(key, caption, media).await
    }
}

// ============================================================================
// Switchboard wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TemplateElements {
    #[serde(default)]
    fields: Vec<TemplateField>,
}

#[derive(Debug, Deserialize)]
struct TemplateField {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct CanvasSize {
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    template: &'a str,
    sizes: Vec<CanvasSize>,
    elements: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    sizes: Vec<RenderedSize>,
}

#[derive(Debug, Deserialize)]
struct RenderedSize {
    #[serde(default)]
    url: Option<String>,
}
