// File: convobot-common/src/models/message.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    OutboundAi,
    OutboundOperator,
}

impl fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDirection::Inbound => write!(f, "inbound"),
            MessageDirection::OutboundAi => write!(f, "outbound_ai"),
            MessageDirection::OutboundOperator => write!(f, "outbound_operator"),
        }
    }
}

impl FromStr for MessageDirection {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbound" => Ok(MessageDirection::Inbound),
            "outbound_ai" => Ok(MessageDirection::OutboundAi),
            "outbound_operator" => Ok(MessageDirection::OutboundOperator),
            _ => Err(format!("Unknown message direction: {}", s)),
        }
    }
}

/// Kind-specific attachment metadata. Serialized as a tagged union into the
/// JSONB `attachment` column.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentKind {
    Image {
        width: Option<u32>,
        height: Option<u32>,
    },
    Video {
        duration_secs: Option<u32>,
    },
    Audio {
        duration_secs: Option<u32>,
        voice_note: bool,
    },
    Document {
        page_count: Option<u32>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
        address: Option<String>,
    },
    Contact {
        contact_name: String,
        contact_phone: Option<String>,
    },
}

impl AttachmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttachmentKind::Image { .. } => "IMAGE",
            AttachmentKind::Video { .. } => "VIDEO",
            AttachmentKind::Audio { .. } => "AUDIO",
            AttachmentKind::Document { .. } => "DOCUMENT",
            AttachmentKind::Location { .. } => "LOCATION",
            AttachmentKind::Contact { .. } => "CONTACT",
        }
    }
}

/// Storage reference produced by the media collaborator, plus the typed
/// kind metadata. Opaque to the ingestion pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Attachment {
    #[serde(flatten)]
    pub kind: AttachmentKind,
    pub url: Option<String>,
    pub storage_path: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Reaction {
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
    pub reactor_id: String,
}

/// Present only on `OutboundAi` messages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AiAudit {
    pub checkpoint_id: String,
    pub processing_ms: u64,
}

/// One immutable ledger entry. `reaction` is the only field that may change
/// after the append (set/cleared by later reaction events).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub message_id: Uuid,
    /// Identity assigned by the external channel; unique per conversation.
    pub channel_message_id: String,
    pub direction: MessageDirection,
    pub timestamp: DateTime<Utc>,
    pub text_content: String,
    pub attachment: Option<Attachment>,
    pub reaction: Option<Reaction>,
    pub ai_audit: Option<AiAudit>,
    /// Caller-supplied idempotency key; required for operator sends.
    pub client_dedup_key: Option<String>,
    /// Operator attribution copied at write time, kept even if the profile's
    /// assignment later changes.
    pub operator_id: Option<String>,
    pub operator_name: Option<String>,
}

impl Message {
    pub fn new(
        channel_message_id: impl Into<String>,
        direction: MessageDirection,
        timestamp: DateTime<Utc>,
        text_content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            channel_message_id: channel_message_id.into(),
            direction,
            timestamp,
            text_content: text_content.into(),
            attachment: None,
            reaction: None,
            ai_audit: None,
            client_dedup_key: None,
            operator_id: None,
            operator_name: None,
        }
    }
}

/// A message located by its channel id, with enough context to address it
/// again (reaction updates).
#[derive(Debug, Clone)]
pub struct LocatedMessage {
    pub conversation_id: String,
    pub position: i64,
    pub message: Message,
}
