// File: convobot-common/src/models/event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of a normalized inbound channel event. The transport layer has
/// already verified and decoded the webhook; this core never sees wire bytes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Text {
        body: String,
    },
    Image {
        caption: Option<String>,
    },
    Video {
        caption: Option<String>,
    },
    Audio {
        voice_note: bool,
    },
    Document {
        file_name: Option<String>,
        caption: Option<String>,
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
    /// A reaction to an earlier message rather than a new ledger entry.
    /// `emoji: None` removes a previous reaction.
    Reaction {
        target_channel_message_id: String,
        emoji: Option<String>,
    },
}

impl EventPayload {
    /// Media-bearing payloads carry an opaque download reference the channel
    /// transport knows how to fetch.
    pub fn has_media(&self) -> bool {
        matches!(
            self,
            EventPayload::Image { .. }
                | EventPayload::Video { .. }
                | EventPayload::Audio { .. }
                | EventPayload::Document { .. }
        )
    }
}

/// One inbound event, normalized by the transport collaborator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Stable external identity of the sender (phone-derived handle).
    pub user_id: String,
    /// Channel-assigned message identity.
    pub channel_message_id: String,
    pub timestamp: DateTime<Utc>,
    pub sender_display_name: Option<String>,
    pub payload: EventPayload,
    /// Opaque handle the channel transport can download media bytes from.
    pub attachment_ref: Option<String>,
}
