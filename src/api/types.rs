//! API request and response types

use crate::snapshots::ErrorSnapshot;
use crate::state_machine::{ClientId, InboundEvent, Payload, WorkflowState};
use serde::{Deserialize, Serialize};

/// An inbound message as the messaging gateway posts it.
///
/// Exactly one of `text`, `button` and `media` must be present.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub client_id: String,
    #[serde(default)]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub button: Option<ButtonReply>,
    #[serde(default)]
    pub media: Option<MediaUpload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReply {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaUpload {
    pub url: String,
    pub mime_type: String,
}

impl MessageRequest {
    /// Split into the addressed client and the engine event
    pub fn into_event(self) -> Result<(ClientId, InboundEvent), String> {
        let client_id = self.client_id.trim();
        if client_id.is_empty() {
            return Err("client_id must not be empty".to_string());
        }

        let payload = match (self.text, self.button, self.media) {
            (Some(text), None, None) => Payload::Text { text },
            (None, Some(button), None) => Payload::Button {
                id: button.id,
                title: button.title,
            },
            (None, None, Some(media)) => Payload::Media {
                url: media.url,
                mime_type: media.mime_type,
            },
            _ => return Err("exactly one of text, button or media is required".to_string()),
        };

        Ok((
            ClientId::new(client_id),
            InboundEvent {
                delivery_id: self.delivery_id,
                payload,
            },
        ))
    }
}

/// Response for an accepted webhook delivery
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub delivery_id: String,
}

#[derive(Debug, Serialize)]
pub struct ClientStateResponse {
    pub client_id: ClientId,
    pub state: WorkflowState,
}

#[derive(Debug, Serialize)]
pub struct ErrorListResponse {
    pub count: usize,
    pub errors: Vec<ErrorSnapshot>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> MessageRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_text_request_becomes_text_event() {
        let (client, event) = request(r#"{"client_id":" +1555 ","delivery_id":"w1","text":"Hi"}"#)
            .into_event()
            .unwrap();
        assert_eq!(client.as_str(), "+1555");
        assert_eq!(event.delivery_id.as_deref(), Some("w1"));
        assert!(matches!(event.payload, Payload::Text { ref text } if text == "Hi"));
    }

    #[test]
    fn test_button_title_is_optional() {
        let (_, event) = request(r#"{"client_id":"c","button":{"id":"yes_images"}}"#)
            .into_event()
            .unwrap();
        assert!(event.delivery_id.is_none());
        assert!(matches!(event.payload, Payload::Button { ref id, .. } if id == "yes_images"));
    }

    #[test]
    fn test_payload_must_be_unambiguous() {
        assert!(request(r#"{"client_id":"c"}"#).into_event().is_err());
        assert!(request(r#"{"client_id":"c","text":"a","button":{"id":"b"}}"#)
            .into_event()
            .is_err());
        assert!(request(r#"{"client_id":"  ","text":"a"}"#).into_event().is_err());
    }
}
