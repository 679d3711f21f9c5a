//! Production implementations of the collaborator traits
//!
//! Generation goes to an OpenAI-compatible chat endpoint, media search to the
//! Unsplash, Pexels and Pixabay APIs, canvas rendering to Switchboard Canvas
//! when a key is configured. Publishing and delivery are dry-run
//! adapters that log what they would send.

mod logging;
mod openai;
mod stock_media;
mod switchboard;

pub use logging::{LoggingCaptionGenerator, LoggingMediaProvider, LoggingPublisher, LoggingTransport};
pub use openai::OpenAiCaptionGenerator;
pub use stock_media::StockMediaProvider;
pub use switchboard::SwitchboardCanvasRenderer;

use crate::runtime::CollaboratorError;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client shared by the adapters
fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            Client::new()
        })
}

/// Send a request and decode a JSON body, classifying failures
async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CollaboratorError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CollaboratorError::network(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            CollaboratorError::network(format!("Connection failed: {e}"))
        } else {
            CollaboratorError::unknown(format!("Request failed: {e}"))
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CollaboratorError::network(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(CollaboratorError::from_status(status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| CollaboratorError::unknown(format!("Failed to parse response: {e}")))
}
