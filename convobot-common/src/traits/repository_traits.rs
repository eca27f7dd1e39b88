// File: convobot-common/src/traits/repository_traits.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::models::message::{LocatedMessage, Message, MessageDirection, Reaction};
use crate::models::user_profile::{ConversationStatus, NewUserProfile, UserProfile};

/// Authoritative store for `UserProfile` aggregates.
///
/// Concurrency safety comes from the store's own atomic primitives: the
/// upsert in `find_or_create` and the single-statement increments in
/// `update_metrics`. Callers never wrap these in application-level locks.
#[async_trait]
pub trait UserProfileRepo: Send + Sync {
    /// Race-safe find-or-create: when two ingestions race to create the same
    /// id, exactly one creation wins and both callers observe the same row.
    async fn find_or_create(&self, seed: &NewUserProfile) -> Result<UserProfile, Error>;

    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, Error>;

    /// Atomically bumps the counter matching `direction` together with
    /// `total_message_count`, stamps the last-message fields and
    /// `updated_at`. `NotFound` if the profile does not exist.
    async fn update_metrics(
        &self,
        user_id: &str,
        direction: MessageDirection,
        text: &str,
        delta: i64,
    ) -> Result<UserProfile, Error>;

    async fn set_conversation_status(
        &self,
        user_id: &str,
        status: ConversationStatus,
    ) -> Result<UserProfile, Error>;

    /// Sets HUMAN status, the operator assignment and the handoff stamp in
    /// one write.
    async fn record_takeover(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error>;

    /// Sets AI status and the handback stamp. Does not touch the operator
    /// assignment; it is retained for audit.
    async fn record_release(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error>;

    /// Soft delete. Profiles are never hard-deleted.
    async fn deactivate(&self, user_id: &str) -> Result<UserProfile, Error>;
}

/// Authoritative store for the append-only message ledger.
#[async_trait]
pub trait ConversationLogRepo: Send + Sync {
    /// Appends in one atomic operation and returns the assigned position.
    /// A collision on the conversation's dedup-key or channel-id uniqueness
    /// surfaces as `Error::DuplicateOperation`.
    async fn append_message(&self, conversation_id: &str, message: &Message)
        -> Result<i64, Error>;

    /// Newest-first. Consumers must still treat entries as a set keyed by
    /// `channel_message_id`, not by position.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, Error>;

    async fn find_by_dedup_key(
        &self,
        conversation_id: &str,
        client_dedup_key: &str,
    ) -> Result<Option<Message>, Error>;

    /// Cross-conversation lookup by channel id; a single consistent read.
    async fn find_message_by_channel_id(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<LocatedMessage>, Error>;

    /// Sets or clears the reaction on the message at `position`.
    async fn update_reaction(
        &self,
        conversation_id: &str,
        position: i64,
        reaction: Option<&Reaction>,
    ) -> Result<(), Error>;
}
