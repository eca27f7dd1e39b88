// File: convobot-common/src/traits/collaborator_traits.rs
//
// External collaborators, specified only by the surface they present to the
// core. Real implementations live outside this subsystem; tests use the
// generated mocks.

use async_trait::async_trait;
use mockall::automock;

use crate::error::Error;
use crate::models::event::NormalizedEvent;
use crate::models::message::{Message, MessageDirection};
use crate::models::user_profile::{ConversationStatus, UserProfile};

/// Receipt for an outbound channel send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub channel_message_id: String,
}

#[derive(Debug, Clone)]
pub struct AttachmentBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Storage reference returned by the media collaborator.
#[derive(Debug, Clone, Default)]
pub struct StoredMedia {
    pub url: Option<String>,
    pub storage_path: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct GeoPlace {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// The external messaging transport. Sends are not idempotent at the channel
/// level, so the idempotency guard makes sure each dedup key reaches this at
/// most once.
#[automock]
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<SendReceipt, Error>;

    async fn download_attachment(&self, attachment_ref: &str)
        -> Result<AttachmentBytes, Error>;
}

/// Media transcoding/upload collaborator.
#[automock]
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn store(
        &self,
        event: &NormalizedEvent,
        bytes: &AttachmentBytes,
        direction: MessageDirection,
    ) -> Result<StoredMedia, Error>;
}

/// Opaque response generator: text in, text out. May be backed by a streaming
/// transport the core never sees.
#[automock]
#[async_trait]
pub trait AiAgent: Send + Sync {
    async fn respond(
        &self,
        text: &str,
        user_id: &str,
        status: ConversationStatus,
    ) -> Result<String, Error>;
}

/// Best-effort reverse geocoding. Never fails; unresolved lookups return a
/// `GeoPlace` with both fields `None`.
#[automock]
#[async_trait]
pub trait GeoEnrichment: Send + Sync {
    async fn resolve(&self, latitude: f64, longitude: f64) -> GeoPlace;
}

/// Secondary read-optimized store fed by the mirror sync pipeline. Never a
/// source of truth.
#[automock]
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), Error>;

    async fn insert_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), Error>;

    async fn ping(&self) -> Result<(), Error>;
}
