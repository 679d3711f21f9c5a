//! Caption generation via an `OpenAI`-compatible chat completions API

use super::{fetch_json, http_client};
use crate::config::ProviderConfig;
use crate::runtime::{CaptionGenerator, CaptionRequest, CollaboratorError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You are a marketing expert. Create engaging social media captions. \
     Reply with the caption only, without quotes or commentary.";

pub struct OpenAiCaptionGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl OpenAiCaptionGenerator {
    pub fn new(config: &ProviderConfig) -> Self {
        let base_url = config
            .openai_base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        Self {
            client: http_client(Duration::from_secs(60)),
            api_key: config.openai_api_key.clone(),
            model: config
                .openai_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: format!("{base_url}/chat/completions"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request(&self, request: &CaptionRequest) -> ChatRequest {
        let mut user = format!(
            "Create an engaging caption for a {} post: {}",
            request.content_type, request.prompt
        );
        if !request.rejected.is_empty() {
            user.push_str("\n\nThe user rejected these captions, so write something different:");
            for rejected in &request.rejected {
                user.push_str("\n- ");
                user.push_str(rejected);
            }
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(user),
                },
            ],
            temperature: 0.8,
        }
    }

    fn extract_caption(response: ChatResponse) -> Result<String, CollaboratorError> {
        let caption = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().trim_matches('"').trim().to_string())
            .unwrap_or_default();
        if caption.is_empty() {
            return Err(CollaboratorError::unknown("Model returned no caption"));
        }
        Ok(caption)
    }
}

#[async_trait]
impl CaptionGenerator for OpenAiCaptionGenerator {
    async fn generate_caption(
        &self,
        request: &CaptionRequest,
    ) -> Result<String, CollaboratorError> {
        let Some(api_key) = &self.api_key else {
            return Err(CollaboratorError::auth("OPENAI_API_KEY is not set"));
        };

        let body = self.build_request(request);
        let response: ChatResponse = fetch_json(
            self.client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&body),
        )
        .await?;
        Self::extract_caption(response)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
