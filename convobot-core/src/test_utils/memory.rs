// File: convobot-core/src/test_utils/memory.rs
//
// In-memory stand-ins for the Postgres repositories and the external
// collaborators. They mirror the store semantics the services rely on:
// atomic-looking upserts, the uniqueness rules of the ledger and the
// duplicate signal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use convobot_common::models::event::NormalizedEvent;
use convobot_common::models::message::{
    LocatedMessage, Message, MessageDirection, Reaction,
};
use convobot_common::models::user_profile::{
    ConversationStatus, HandoffRecord, MessageMetrics, NewUserProfile, UserProfile,
};
use convobot_common::traits::collaborator_traits::{
    AiAgent, AttachmentBytes, ChannelTransport, GeoEnrichment, GeoPlace, MediaProcessor,
    MirrorStore, SendReceipt, StoredMedia,
};
use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};
use crate::Error;

fn blank_profile(seed: &NewUserProfile, now: DateTime<Utc>) -> UserProfile {
    UserProfile {
        user_id: seed.user_id.clone(),
        display_name: seed.display_name.clone(),
        contact_address: seed.contact_address.clone(),
        conversation_status: ConversationStatus::Ai,
        assigned_operator_id: None,
        assigned_operator_name: None,
        last_handoff_to_human: None,
        last_handoff_to_ai: None,
        is_active: true,
        user_metrics: MessageMetrics::default(),
        ai_metrics: MessageMetrics::default(),
        operator_metrics: MessageMetrics::default(),
        total_message_count: 0,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct MemoryUserProfileRepo {
    profiles: Mutex<HashMap<String, UserProfile>>,
    /// When set, `update_metrics` fails: simulates the append-then-increment
    /// inconsistency window.
    pub fail_metrics: AtomicBool,
}

impl MemoryUserProfileRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserProfileRepo for MemoryUserProfileRepo {
    async fn find_or_create(&self, seed: &NewUserProfile) -> Result<UserProfile, Error> {
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .entry(seed.user_id.clone())
            .or_insert_with(|| blank_profile(seed, Utc::now()));
        if profile.display_name.is_none() {
            profile.display_name = seed.display_name.clone();
        }
        Ok(profile.clone())
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, Error> {
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }

    async fn update_metrics(
        &self,
        user_id: &str,
        direction: MessageDirection,
        text: &str,
        delta: i64,
    ) -> Result<UserProfile, Error> {
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected metrics failure".into()));
        }
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        let now = Utc::now();
        let metrics = match direction {
            MessageDirection::Inbound => &mut profile.user_metrics,
            MessageDirection::OutboundAi => &mut profile.ai_metrics,
            MessageDirection::OutboundOperator => &mut profile.operator_metrics,
        };
        metrics.message_count += delta;
        metrics.last_message = Some(text.to_string());
        metrics.last_message_at = Some(now);
        profile.total_message_count += delta;
        profile.updated_at = now;
        Ok(profile.clone())
    }

    async fn set_conversation_status(
        &self,
        user_id: &str,
        status: ConversationStatus,
    ) -> Result<UserProfile, Error> {
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        profile.conversation_status = status;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn record_takeover(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error> {
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        profile.conversation_status = ConversationStatus::Human;
        profile.assigned_operator_id = Some(operator_id.to_string());
        profile.assigned_operator_name = Some(operator_name.to_string());
        profile.last_handoff_to_human = Some(HandoffRecord {
            timestamp: at,
            operator_id: operator_id.to_string(),
            operator_name: operator_name.to_string(),
        });
        profile.updated_at = at;
        Ok(profile.clone())
    }

    async fn record_release(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error> {
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        profile.conversation_status = ConversationStatus::Ai;
        profile.last_handoff_to_ai = Some(HandoffRecord {
            timestamp: at,
            operator_id: operator_id.to_string(),
            operator_name: operator_name.to_string(),
        });
        profile.updated_at = at;
        Ok(profile.clone())
    }

    async fn deactivate(&self, user_id: &str) -> Result<UserProfile, Error> {
        let mut map = self.profiles.lock().unwrap();
        let profile = map
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        profile.is_active = false;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Default)]
pub struct MemoryConversationLogRepo {
    logs: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryConversationLogRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationLogRepo for MemoryConversationLogRepo {
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<i64, Error> {
        let mut map = self.logs.lock().unwrap();
        let log = map.entry(conversation_id.to_string()).or_default();
        if let Some(key) = message.client_dedup_key.as_deref() {
            if log
                .iter()
                .any(|m| m.client_dedup_key.as_deref() == Some(key))
            {
                return Err(Error::DuplicateOperation(format!(
                    "dedup key '{}' already used in conversation '{}'",
                    key, conversation_id
                )));
            }
        }
        if log
            .iter()
            .any(|m| m.channel_message_id == message.channel_message_id)
        {
            return Err(Error::DuplicateOperation(format!(
                "channel message '{}' already stored in conversation '{}'",
                message.channel_message_id, conversation_id
            )));
        }
        log.push(message.clone());
        Ok((log.len() - 1) as i64)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, Error> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .map(|log| log.iter().rev().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_dedup_key(
        &self,
        conversation_id: &str,
        client_dedup_key: &str,
    ) -> Result<Option<Message>, Error> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .and_then(|log| {
                log.iter()
                    .find(|m| m.client_dedup_key.as_deref() == Some(client_dedup_key))
                    .cloned()
            }))
    }

    async fn find_message_by_channel_id(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<LocatedMessage>, Error> {
        let map = self.logs.lock().unwrap();
        for (conversation_id, log) in map.iter() {
            if let Some((position, message)) = log
                .iter()
                .enumerate()
                .find(|(_, m)| m.channel_message_id == channel_message_id)
            {
                return Ok(Some(LocatedMessage {
                    conversation_id: conversation_id.clone(),
                    position: position as i64,
                    message: message.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn update_reaction(
        &self,
        conversation_id: &str,
        position: i64,
        reaction: Option<&Reaction>,
    ) -> Result<(), Error> {
        let mut map = self.logs.lock().unwrap();
        let message = map
            .get_mut(conversation_id)
            .and_then(|log| log.get_mut(position as usize))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "message at position {} in conversation '{}'",
                    position, conversation_id
                ))
            })?;
        message.reaction = reaction.cloned();
        Ok(())
    }
}

/// Channel transport fake: records every send, hands out sequential channel
/// message ids, optionally fails.
#[derive(Default)]
pub struct RecordingChannel {
    seq: AtomicU64,
    pub sends: Mutex<Vec<(String, String)>>,
    pub fail_sends: AtomicBool,
    pub fail_downloads: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelTransport for RecordingChannel {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<SendReceipt, Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected channel failure".into()));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.sends
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(SendReceipt {
            channel_message_id: format!("wamid-{}", n),
        })
    }

    async fn download_attachment(
        &self,
        _attachment_ref: &str,
    ) -> Result<AttachmentBytes, Error> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected download failure".into()));
        }
        Ok(AttachmentBytes {
            bytes: vec![0u8; 16],
            mime_type: Some("application/octet-stream".to_string()),
        })
    }
}

/// Media fake that returns a deterministic storage reference.
#[derive(Default)]
pub struct StaticMedia;

#[async_trait]
impl MediaProcessor for StaticMedia {
    async fn store(
        &self,
        event: &NormalizedEvent,
        bytes: &AttachmentBytes,
        _direction: MessageDirection,
    ) -> Result<StoredMedia, Error> {
        Ok(StoredMedia {
            url: Some(format!("https://media.test/{}", event.channel_message_id)),
            storage_path: Some(format!("media/{}", event.channel_message_id)),
            mime_type: bytes.mime_type.clone(),
            file_name: None,
            file_size: Some(bytes.bytes.len() as u64),
        })
    }
}

/// AI fake with a fixed reply, optional delay (timeout tests) and optional
/// failure. Counts invocations so tests can assert the context-tracking call
/// happened even in HUMAN mode.
pub struct StaticAi {
    pub reply: String,
    pub delay: Option<Duration>,
    pub fail: AtomicBool,
    pub calls: AtomicU64,
}

impl StaticAi {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            delay: None,
            fail: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiAgent for StaticAi {
    async fn respond(
        &self,
        _text: &str,
        _user_id: &str,
        _status: ConversationStatus,
    ) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected AI failure".into()));
        }
        Ok(self.reply.clone())
    }
}

/// Geo fake resolving everything to nowhere.
#[derive(Default)]
pub struct NullGeo;

#[async_trait]
impl GeoEnrichment for NullGeo {
    async fn resolve(&self, _latitude: f64, _longitude: f64) -> GeoPlace {
        GeoPlace::default()
    }
}

/// Mirror store fake: records replicated items, optionally fails.
#[derive(Default)]
pub struct RecordingMirrorStore {
    pub profiles: Mutex<Vec<UserProfile>>,
    pub messages: Mutex<Vec<(String, Message)>>,
    pub fail: AtomicBool,
}

impl RecordingMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorStore for RecordingMirrorStore {
    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected mirror failure".into()));
        }
        self.profiles.lock().unwrap().push(profile.clone());
        Ok(())
    }

    async fn insert_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected mirror failure".into()));
        }
        self.messages
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), message.clone()));
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Upstream("injected mirror failure".into()));
        }
        Ok(())
    }
}
