// File: convobot-core/src/services/ingestion_service.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use convobot_common::models::event::{EventPayload, NormalizedEvent};
use convobot_common::models::message::{
    AiAudit, Attachment, AttachmentKind, Message, MessageDirection, Reaction,
};
use convobot_common::models::sync::SyncItem;
use convobot_common::models::user_profile::{ConversationStatus, NewUserProfile, UserProfile};
use convobot_common::traits::collaborator_traits::{
    AiAgent, ChannelTransport, GeoEnrichment, MediaProcessor,
};
use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};
use convobot_common::validate;
use crate::sync::MirrorSyncPipeline;
use crate::Error;

/// Orchestrates one normalized event through the ingestion pipeline:
/// find-or-create profile, media delegation, canonical text, append + metric
/// update on the authoritative store, AI response handling, mirror enqueue.
///
/// The pipeline is best-effort, not one transaction: append and metric update
/// are sequential, and a metric failure after a durable append is logged, not
/// fatal.
pub struct MessageIngestionService {
    profile_repo: Arc<dyn UserProfileRepo>,
    log_repo: Arc<dyn ConversationLogRepo>,
    channel: Arc<dyn ChannelTransport>,
    media: Arc<dyn MediaProcessor>,
    ai: Arc<dyn AiAgent>,
    geo: Arc<dyn GeoEnrichment>,
    mirror: Arc<MirrorSyncPipeline>,
    ai_timeout: Duration,
    ai_fallback_reply: String,
    ai_checkpoint: String,
}

impl MessageIngestionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile_repo: Arc<dyn UserProfileRepo>,
        log_repo: Arc<dyn ConversationLogRepo>,
        channel: Arc<dyn ChannelTransport>,
        media: Arc<dyn MediaProcessor>,
        ai: Arc<dyn AiAgent>,
        geo: Arc<dyn GeoEnrichment>,
        mirror: Arc<MirrorSyncPipeline>,
        ai_timeout: Duration,
        ai_fallback_reply: String,
        ai_checkpoint: String,
    ) -> Self {
        Self {
            profile_repo,
            log_repo,
            channel,
            media,
            ai,
            geo,
            mirror,
            ai_timeout,
            ai_fallback_reply,
            ai_checkpoint,
        }
    }

    /// Processes one external delivery batch strictly in order, so a user's
    /// rapid-fire messages never reorder. Per-event failures are logged and
    /// the rest of the batch still runs; store hard failures abort.
    pub async fn ingest_batch(&self, events: &[NormalizedEvent]) -> Result<(), Error> {
        for event in events {
            match self.ingest_event(event).await {
                Ok(()) => {}
                Err(e @ Error::Database(_)) | Err(e @ Error::Migration(_)) => {
                    error!("store failure while ingesting batch: {:?}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "event '{}' from '{}' failed, continuing batch: {:?}",
                        event.channel_message_id, event.user_id, e
                    );
                }
            }
        }
        Ok(())
    }

    /// Processes a single inbound event:
    ///  1. Find-or-create the sender's profile (race-tolerant upsert).
    ///  2. Resolve media through the media collaborator, if any.
    ///  3. Build the canonical text line for the ledger.
    ///  4. Append to the ledger, then bump metrics (sequential, see above).
    ///  5. Run the AI in both modes for context; send its reply only in AI mode.
    ///  6. Queue a mirror sync without waiting for it.
    pub async fn ingest_event(&self, event: &NormalizedEvent) -> Result<(), Error> {
        validate::validate_user_id(&event.user_id)?;
        validate::validate_channel_message_id(&event.channel_message_id)?;

        // Reactions mutate an earlier entry instead of appending a new one.
        if let EventPayload::Reaction {
            target_channel_message_id,
            emoji,
        } = &event.payload
        {
            return self
                .apply_reaction(event, target_channel_message_id, emoji.as_deref())
                .await;
        }

        let profile = self
            .profile_repo
            .find_or_create(&NewUserProfile {
                user_id: event.user_id.clone(),
                display_name: event
                    .sender_display_name
                    .as_deref()
                    .and_then(|n| validate::sanitize_field(n, 128)),
                contact_address: None,
            })
            .await?;

        let attachment = self.resolve_attachment(event).await;
        // Bounded once; the ledger entry and the last-message metric column
        // must hold the same text.
        let text_content = validate::bound_text(&self.canonical_text(event).await);

        let mut message = Message::new(
            event.channel_message_id.clone(),
            MessageDirection::Inbound,
            event.timestamp,
            text_content.clone(),
        );
        message.attachment = attachment;

        match self.log_repo.append_message(&event.user_id, &message).await {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {
                // Webhook redelivery of an already-stored channel message.
                // Dropping it here also prevents a second AI reply.
                debug!(
                    "channel message '{}' already in ledger for '{}', ignoring redelivery",
                    event.channel_message_id, event.user_id
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.mirror.enqueue(SyncItem::Message {
            conversation_id: event.user_id.clone(),
            message,
        });

        let profile = match self
            .profile_repo
            .update_metrics(&event.user_id, MessageDirection::Inbound, &text_content, 1)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                // Message durable, counter behind: accepted inconsistency
                // window, picked up by reconciliation outside this core.
                error!(
                    "inbound metrics update failed for '{}' after durable append: {:?}",
                    event.user_id, e
                );
                profile
            }
        };

        let profile = if let EventPayload::Text { body } = &event.payload {
            self.handle_ai_turn(profile, body).await
        } else {
            profile
        };

        self.mirror.enqueue(SyncItem::Profile(profile));
        Ok(())
    }

    /// The AI runs for every inbound text regardless of mode so it keeps
    /// conversational context; in HUMAN mode its output is discarded instead
    /// of sent.
    async fn handle_ai_turn(&self, profile: UserProfile, inbound_text: &str) -> UserProfile {
        let started = Instant::now();
        let (reply, fallback_used) = self
            .ai_respond(inbound_text, &profile.user_id, profile.conversation_status)
            .await;
        let reply = validate::bound_text(&reply);
        let processing_ms = started.elapsed().as_millis() as u64;

        if profile.conversation_status == ConversationStatus::Human {
            debug!(
                "conversation '{}' is HUMAN-owned, discarding AI reply",
                profile.user_id
            );
            return profile;
        }

        let receipt = match self.channel.send_text(&profile.user_id, &reply).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    "AI reply send failed for '{}', user gets nothing this turn: {:?}",
                    profile.user_id, e
                );
                return profile;
            }
        };

        let mut message = Message::new(
            receipt.channel_message_id,
            MessageDirection::OutboundAi,
            Utc::now(),
            reply.clone(),
        );
        message.ai_audit = Some(AiAudit {
            checkpoint_id: if fallback_used {
                "fallback".to_string()
            } else {
                self.ai_checkpoint.clone()
            },
            processing_ms,
        });

        match self.log_repo.append_message(&profile.user_id, &message).await {
            Ok(_) => {
                self.mirror.enqueue(SyncItem::Message {
                    conversation_id: profile.user_id.clone(),
                    message,
                });
            }
            Err(e) => {
                warn!(
                    "AI reply sent but not recorded for '{}': {:?}",
                    profile.user_id, e
                );
                return profile;
            }
        }

        match self
            .profile_repo
            .update_metrics(&profile.user_id, MessageDirection::OutboundAi, &reply, 1)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                error!(
                    "AI metrics update failed for '{}' after durable append: {:?}",
                    profile.user_id, e
                );
                profile
            }
        }
    }

    /// Time-boxed AI call with one retry; the fallback apology text keeps the
    /// user-facing channel from going silent on collaborator failure.
    async fn ai_respond(
        &self,
        text: &str,
        user_id: &str,
        status: ConversationStatus,
    ) -> (String, bool) {
        for attempt in 0..2 {
            match timeout(self.ai_timeout, self.ai.respond(text, user_id, status)).await {
                Ok(Ok(reply)) => return (reply, false),
                Ok(Err(e)) => {
                    warn!("AI respond attempt {} failed for '{}': {:?}", attempt + 1, user_id, e);
                }
                Err(_) => {
                    warn!(
                        "AI respond attempt {} timed out after {:?} for '{}'",
                        attempt + 1,
                        self.ai_timeout,
                        user_id
                    );
                }
            }
        }
        (self.ai_fallback_reply.clone(), true)
    }

    /// Downloads and stores media through the collaborators. Degrades to a
    /// kind-only attachment when either step fails so the ledger still knows
    /// what arrived.
    async fn resolve_attachment(&self, event: &NormalizedEvent) -> Option<Attachment> {
        let kind = attachment_kind_for(&event.payload)?;
        let mut attachment = Attachment {
            kind,
            url: None,
            storage_path: None,
            mime_type: None,
            file_name: None,
            file_size: None,
        };

        if !event.payload.has_media() {
            return Some(attachment);
        }
        let Some(attachment_ref) = event.attachment_ref.as_deref() else {
            warn!(
                "media event '{}' arrived without an attachment ref",
                event.channel_message_id
            );
            return Some(attachment);
        };

        let bytes = match self.channel.download_attachment(attachment_ref).await {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    "attachment download failed for '{}': {:?}",
                    event.channel_message_id, e
                );
                return Some(attachment);
            }
        };
        match self
            .media
            .store(event, &bytes, MessageDirection::Inbound)
            .await
        {
            Ok(stored) => {
                attachment.url = stored.url;
                attachment.storage_path = stored.storage_path;
                attachment.mime_type = stored.mime_type.or(bytes.mime_type.clone());
                attachment.file_name = stored.file_name;
                attachment.file_size = stored.file_size;
            }
            Err(e) => {
                warn!(
                    "media store failed for '{}': {:?}",
                    event.channel_message_id, e
                );
            }
        }
        Some(attachment)
    }

    /// Builds the canonical human-readable line for the ledger. Non-text
    /// events get a bracketed placeholder so the log always has something to
    /// show even when rendering fails upstream.
    async fn canonical_text(&self, event: &NormalizedEvent) -> String {
        match &event.payload {
            EventPayload::Text { body } => body.clone(),
            EventPayload::Image { caption } => placeholder("IMAGE", caption.as_deref(), "Photo"),
            EventPayload::Video { caption } => placeholder("VIDEO", caption.as_deref(), "Video"),
            EventPayload::Audio { voice_note } => {
                let what = if *voice_note { "Voice message" } else { "Audio" };
                format!("[AUDIO] {}", what)
            }
            EventPayload::Document { file_name, caption } => placeholder(
                "DOCUMENT",
                caption.as_deref().or(file_name.as_deref()),
                "Document",
            ),
            EventPayload::Location {
                latitude,
                longitude,
                name,
                address,
            } => {
                // Enrichment is best-effort; coordinates are the floor.
                let place = self.geo.resolve(*latitude, *longitude).await;
                let name = name.clone().or(place.name);
                let address = address.clone().or(place.address);
                match (name, address) {
                    (Some(n), Some(a)) => format!("[LOCATION] {} ({})", n, a),
                    (Some(n), None) => format!("[LOCATION] {}", n),
                    (None, Some(a)) => format!("[LOCATION] {}", a),
                    (None, None) => format!("[LOCATION] {:.5}, {:.5}", latitude, longitude),
                }
            }
            EventPayload::Contact {
                contact_name,
                contact_phone,
            } => match contact_phone {
                Some(phone) => format!("[CONTACT] {} ({})", contact_name, phone),
                None => format!("[CONTACT] {}", contact_name),
            },
            // Routed before this point; keep a line anyway.
            EventPayload::Reaction { .. } => "[REACTION]".to_string(),
        }
    }

    async fn apply_reaction(
        &self,
        event: &NormalizedEvent,
        target_channel_message_id: &str,
        emoji: Option<&str>,
    ) -> Result<(), Error> {
        validate::validate_channel_message_id(target_channel_message_id)?;
        let located = self
            .log_repo
            .find_message_by_channel_id(target_channel_message_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "reaction target '{}' not in any conversation",
                    target_channel_message_id
                ))
            })?;

        let reaction = emoji.map(|e| Reaction {
            emoji: e.to_string(),
            timestamp: event.timestamp,
            reactor_id: event.user_id.clone(),
        });
        self.log_repo
            .update_reaction(&located.conversation_id, located.position, reaction.as_ref())
            .await?;
        info!(
            "reaction {} on message '{}' in conversation '{}'",
            emoji.unwrap_or("removed"),
            target_channel_message_id,
            located.conversation_id
        );

        let mut message = located.message;
        message.reaction = reaction;
        self.mirror.enqueue(SyncItem::Message {
            conversation_id: located.conversation_id,
            message,
        });
        Ok(())
    }
}

fn placeholder(label: &str, caption: Option<&str>, default: &str) -> String {
    let caption = caption.map(str::trim).filter(|c| !c.is_empty());
    format!("[{}] {}", label, caption.unwrap_or(default))
}

fn attachment_kind_for(payload: &EventPayload) -> Option<AttachmentKind> {
    match payload {
        EventPayload::Image { .. } => Some(AttachmentKind::Image {
            width: None,
            height: None,
        }),
        EventPayload::Video { .. } => Some(AttachmentKind::Video {
            duration_secs: None,
        }),
        EventPayload::Audio { voice_note } => Some(AttachmentKind::Audio {
            duration_secs: None,
            voice_note: *voice_note,
        }),
        EventPayload::Document { .. } => Some(AttachmentKind::Document { page_count: None }),
        EventPayload::Location {
            latitude,
            longitude,
            name,
            address,
        } => Some(AttachmentKind::Location {
            latitude: *latitude,
            longitude: *longitude,
            name: name.clone(),
            address: address.clone(),
        }),
        EventPayload::Contact {
            contact_name,
            contact_phone,
        } => Some(AttachmentKind::Contact {
            contact_name: contact_name.clone(),
            contact_phone: contact_phone.clone(),
        }),
        EventPayload::Text { .. } | EventPayload::Reaction { .. } => None,
    }
}
