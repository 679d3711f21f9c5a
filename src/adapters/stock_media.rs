//! Stock image search across Unsplash, Pexels and Pixabay

use super::{fetch_json, http_client};
use crate::config::ProviderConfig;
use crate::handlers::MAX_MEDIA_OPTIONS;
use crate::runtime::{CollaboratorError, MediaProvider};
use crate::state_machine::{MediaItem, MediaSource, RenderedAsset};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const UNSPLASH_SEARCH: &str = "https://api.unsplash.com/search/photos";
const PEXELS_SEARCH: &str = "https://api.pexels.com/v1/search";
const PIXABAY_SEARCH: &str = "https://pixabay.com/api/";

pub struct StockMediaProvider {
    client: Client,
    unsplash_key: Option<String>,
    pexels_key: Option<String>,
    pixabay_key: Option<String>,
}

impl StockMediaProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: http_client(Duration::from_secs(10)),
            unsplash_key: config.unsplash_access_key.clone(),
            pexels_key: config.pexels_api_key.clone(),
            pixabay_key: config.pixabay_api_key.clone(),
        }
    }

    /// Sources with credentials configured
    pub fn configured_sources(&self) -> Vec<MediaSource> {
        [
            (MediaSource::Unsplash, &self.unsplash_key),
            (MediaSource::Pexels, &self.pexels_key),
            (MediaSource::Pixabay, &self.pixabay_key),
        ]
        .into_iter()
        .filter(|(_, key)| key.is_some())
        .map(|(source, _)| source)
        .collect()
    }

    fn key_for(&self, source: MediaSource) -> Result<&str, CollaboratorError> {
        let key = match source {
            MediaSource::Unsplash => &self.unsplash_key,
            MediaSource::Pexels => &self.pexels_key,
            MediaSource::Pixabay => &self.pixabay_key,
            MediaSource::Upload => {
                return Err(CollaboratorError::invalid_request(
                    "uploads are not searchable",
                ))
            }
        };
        key.as_deref()
            .ok_or_else(|| CollaboratorError::auth(format!("no API key configured for {source}")))
    }

    async fn search_unsplash(&self, query: &str, key: &str) -> Result<Vec<MediaItem>, CollaboratorError> {
        let response: UnsplashSearch = fetch_json(
            self.client
                .get(UNSPLASH_SEARCH)
                .header("Accept-Version", "v1")
                .header("Authorization", format!("Client-ID {key}"))
                .query(&[("query", query), ("per_page", per_page().as_str())]),
        )
        .await?;
        Ok(response.into_items())
    }

    async fn search_pexels(&self, query: &str, key: &str) -> Result<Vec<MediaItem>, CollaboratorError> {
        let response: PexelsSearch = fetch_json(
            self.client
                .get(PEXELS_SEARCH)
                .header("Authorization", key)
                .query(&[("query", query), ("per_page", per_page().as_str())]),
        )
        .await?;
        Ok(response.into_items())
    }

    async fn search_pixabay(&self, query: &str, key: &str) -> Result<Vec<MediaItem>, CollaboratorError> {
        let response: PixabaySearch = fetch_json(self.client.get(PIXABAY_SEARCH).query(&[
            ("key", key),
            ("q", query),
            ("image_type", "photo"),
            ("per_page", per_page().as_str()),
        ]))
        .await?;
        Ok(response.into_items())
    }
}

fn per_page() -> String {
    MAX_MEDIA_OPTIONS.to_string()
}

#[async_trait]
impl MediaProvider for StockMediaProvider {
    async fn search_media(
        &self,
        query: &str,
        source: MediaSource,
    ) -> Result<Vec<MediaItem>, CollaboratorError> {
        let key = self.key_for(source)?;
        let items = match source {
            MediaSource::Unsplash => self.search_unsplash(query, key).await?,
            MediaSource::Pexels => self.search_pexels(query, key).await?,
            MediaSource::Pixabay => self.search_pixabay(query, key).await?,
            MediaSource::Upload => Vec::new(),
        };
        tracing::info!(source = %source, results = items.len(), "Stock media search finished");
        Ok(items)
    }

    /// Pairs the caption with the chosen image; templated canvas rendering
    /// is left to the publishing side
    async fn render_canvas(
        &self,
        caption: &str,
        media: &MediaItem,
    ) -> Result<RenderedAsset, CollaboratorError> {
        if media.url.is_empty() {
            return Err(CollaboratorError::invalid_request("media item has no URL"));
        }
        Ok(RenderedAsset {
            url: media.url.clone(),
            caption: caption.to_string(),
        })
    }
}

// ============================================================================
// Provider responses
// ============================================================================

#[derive(Debug, Deserialize)]
struct UnsplashSearch {
    #[serde(default)]
    results: Vec<UnsplashPhoto>,
}

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    urls: UnsplashUrls,
    #[serde(default)]
    alt_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnsplashUrls {
    #[serde(default)]
    regular: Option<String>,
    #[serde(default)]
    raw: Option<String>,
}

impl UnsplashSearch {
    fn into_items(self) -> Vec<MediaItem> {
        self.results
            .into_iter()
            .filter_map(|photo| {
                let url = photo.urls.regular.or(photo.urls.raw)?;
                Some(MediaItem {
                    url,
                    description: photo.alt_description,
                    source: MediaSource::Unsplash,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PexelsSearch {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
    #[serde(default)]
    alt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    #[serde(default)]
    large: Option<String>,
    #[serde(default)]
    original: Option<String>,
}

impl PexelsSearch {
    fn into_items(self) -> Vec<MediaItem> {
        self.photos
            .into_iter()
            .filter_map(|photo| {
                let url = photo.src.large.or(photo.src.original)?;
                Some(MediaItem {
                    url,
                    description: photo.alt.filter(|a| !a.is_empty()),
                    source: MediaSource::Pexels,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PixabaySearch {
    #[serde(default)]
    hits: Vec<PixabayHit>,
}

#[derive(Debug, Deserialize)]
struct PixabayHit {
    #[serde(default, rename = "webformatURL")]
    webformat_url: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

impl PixabaySearch {
    fn into_items(self) -> Vec<MediaItem> {
        self.hits
            .into_iter()
            .filter_map(|hit| {
                let url = hit.webformat_url.filter(|u| !u.is_empty())?;
                Some(MediaItem {
                    url,
                    description: hit.tags,
                    source: MediaSource::Pixabay,
                })
            })
            .collect()
    }
}
