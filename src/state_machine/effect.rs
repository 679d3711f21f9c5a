//! Outbound message descriptors produced by transitions

use serde::{Deserialize, Serialize};

/// Interactive reply button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A message the transport should send back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        body: String,
    },
    Buttons {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header: Option<String>,
        body: String,
        buttons: Vec<Button>,
    },
    Media {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutboundMessage {
    pub fn text(body: impl Into<String>) -> Self {
        OutboundMessage::Text { body: body.into() }
    }

    pub fn media(url: impl Into<String>, caption: Option<String>) -> Self {
        OutboundMessage::Media {
            url: url.into(),
            caption,
        }
    }

    /// Main text of the message, for logs and tests
    pub fn body(&self) -> &str {
        match self {
            OutboundMessage::Text { body } | OutboundMessage::Buttons { body, .. } => body,
            OutboundMessage::Media { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }
}
