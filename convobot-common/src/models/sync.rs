// File: convobot-common/src/models/sync.rs

use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::user_profile::UserProfile;

/// One unit of replication work for the mirror store.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncItem {
    Profile(UserProfile),
    Message {
        conversation_id: String,
        message: Message,
    },
}

impl SyncItem {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncItem::Profile(_) => "profile",
            SyncItem::Message { .. } => "message",
        }
    }
}

/// Point-in-time counters from the mirror sync pipeline, for health checks.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Items rejected at enqueue time because the queue was full.
    pub dropped: u64,
}
