//! Inbound events and the normalized input handlers see

use serde::{Deserialize, Serialize};

/// An event delivered by the transport for one client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Transport delivery identifier used for deduplication
    #[serde(default)]
    pub delivery_id: Option<String>,
    pub payload: Payload,
}

/// Raw payload as received from the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text { text: String },
    Button { id: String, title: String },
    Media { url: String, mime_type: String },
}

impl InboundEvent {
    pub fn text(delivery_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            delivery_id: Some(delivery_id.into()),
            payload: Payload::Text { text: text.into() },
        }
    }

    pub fn button(delivery_id: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            delivery_id: Some(delivery_id.into()),
            payload: Payload::Button {
                title: id.clone(),
                id,
            },
        }
    }

    pub fn media(
        delivery_id: impl Into<String>,
        url: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            delivery_id: Some(delivery_id.into()),
            payload: Payload::Media {
                url: url.into(),
                mime_type: mime_type.into(),
            },
        }
    }

    /// Delivery id, assigning a fresh one when the transport did not carry any
    pub fn delivery_id_or_assign(&self) -> String {
        self.delivery_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Normalized input handed to state handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Free text; `normalized` is trimmed and lower-cased for matching
    Text { raw: String, normalized: String },
    /// Interactive button reply, matched by id
    Button { id: String },
    /// Uploaded media
    Media { url: String, mime_type: String },
    /// Synthesized by the manager when a transition chains into the next state
    Enter,
}

impl Input {
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Input::Text { raw, normalized }
    }

    /// The matchable token for text and button input
    pub fn token(&self) -> Option<&str> {
        match self {
            Input::Text { normalized, .. } => Some(normalized),
            Input::Button { id } => Some(id),
            Input::Media { .. } | Input::Enter => None,
        }
    }

    pub fn is_affirmative(&self) -> bool {
        matches!(
            self.token(),
            Some("y" | "yes" | "yes_images" | "yes include images" | "confirm")
        )
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self.token(),
            Some("n" | "no" | "no_images" | "no caption only")
        )
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self.token(), Some("cancel" | "stop" | "quit"))
    }

    /// Short description for logs, never the full user text
    pub fn kind(&self) -> &'static str {
        match self {
            Input::Text { .. } => "text",
            Input::Button { .. } => "button",
            Input::Media { .. } => "media",
            Input::Enter => "enter",
        }
    }
}

impl From<Payload> for Input {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text { text } => Input::text(text),
            Payload::Button { id, .. } => Input::Button { id: normalize(&id) },
            Payload::Media { url, mime_type } => Input::Media { url, mime_type },
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
