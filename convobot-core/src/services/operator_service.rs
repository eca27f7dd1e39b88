// File: convobot-core/src/services/operator_service.rs
//
// Operator-facing send path with the idempotency guard: at-most-once channel
// send per caller-supplied dedup key, scoped to the conversation.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};

use convobot_common::models::message::{Message, MessageDirection};
use convobot_common::models::sync::SyncItem;
use convobot_common::traits::collaborator_traits::ChannelTransport;
use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};
use convobot_common::validate;
use crate::sync::MirrorSyncPipeline;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSendResult {
    pub channel_message_id: String,
    pub is_duplicate: bool,
}

pub struct OperatorMessageService {
    profile_repo: Arc<dyn UserProfileRepo>,
    log_repo: Arc<dyn ConversationLogRepo>,
    channel: Arc<dyn ChannelTransport>,
    mirror: Arc<MirrorSyncPipeline>,
}

impl OperatorMessageService {
    pub fn new(
        profile_repo: Arc<dyn UserProfileRepo>,
        log_repo: Arc<dyn ConversationLogRepo>,
        channel: Arc<dyn ChannelTransport>,
        mirror: Arc<MirrorSyncPipeline>,
    ) -> Self {
        Self {
            profile_repo,
            log_repo,
            channel,
            mirror,
        }
    }

    /// Sends an operator message with at-most-once externally visible effect.
    ///
    /// Protocol:
    /// 1. If a message with this dedup key already exists, short-circuit with
    ///    `is_duplicate = true`: no new send, no new write.
    /// 2. Otherwise perform the channel send first (it is not idempotent at
    ///    the channel level), then persist with the key set.
    /// 3. The pre-check and the insert are not atomic with each other; the
    ///    store's unique index settles a race between identical retries, and
    ///    that rejection also maps to `is_duplicate = true`.
    ///
    /// If the send lands but the write fails, `Error::PartialSend` carries the
    /// channel message id so the caller can reconcile.
    pub async fn send_operator_message(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        text: &str,
        client_dedup_key: &str,
    ) -> Result<OperatorSendResult, Error> {
        validate::validate_user_id(user_id)?;
        validate::validate_dedup_key(client_dedup_key)?;
        if operator_id.trim().is_empty() {
            return Err(Error::Validation("operator id must not be empty".into()));
        }
        if text.trim().is_empty() {
            return Err(Error::Validation("message text must not be empty".into()));
        }

        // Operators may message in either mode; sending is not an implicit
        // takeover. The conversation must already exist though.
        self.profile_repo
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;

        // Step 1: dedup pre-check.
        if let Some(existing) = self
            .log_repo
            .find_by_dedup_key(user_id, client_dedup_key)
            .await?
        {
            debug!(
                "dedup key '{}' already used in conversation '{}', short-circuiting",
                client_dedup_key, user_id
            );
            return Ok(OperatorSendResult {
                channel_message_id: existing.channel_message_id,
                is_duplicate: true,
            });
        }

        // Step 2: external send, at most once from this path.
        let receipt = self
            .channel
            .send_text(user_id, text)
            .await
            .map_err(|e| Error::Upstream(format!("channel send failed: {}", e)))?;

        // The ledger entry and the last-message metric column must hold the
        // same bounded text.
        let text_content = validate::bound_text(text);
        let mut message = Message::new(
            receipt.channel_message_id.clone(),
            MessageDirection::OutboundOperator,
            Utc::now(),
            text_content.clone(),
        );
        message.client_dedup_key = Some(client_dedup_key.to_string());
        message.operator_id = Some(operator_id.to_string());
        message.operator_name = Some(operator_name.to_string());

        // Step 3: persist; the store arbitrates retry races.
        match self.log_repo.append_message(user_id, &message).await {
            Ok(_) => {}
            Err(e) if e.is_duplicate() => {
                warn!(
                    "dedup key '{}' raced in conversation '{}'; store kept the first insert",
                    client_dedup_key, user_id
                );
                return Ok(OperatorSendResult {
                    channel_message_id: receipt.channel_message_id,
                    is_duplicate: true,
                });
            }
            Err(e) => {
                return Err(Error::PartialSend {
                    channel_message_id: receipt.channel_message_id,
                    detail: e.to_string(),
                });
            }
        }

        // Metric failure leaves the message durable but undercounted; this is
        // the documented inconsistency window, monitored rather than fatal.
        match self
            .profile_repo
            .update_metrics(user_id, MessageDirection::OutboundOperator, &text_content, 1)
            .await
        {
            Ok(updated) => self.mirror.enqueue(SyncItem::Profile(updated)),
            Err(e) => error!(
                "operator metrics update failed for '{}' after durable append: {:?}",
                user_id, e
            ),
        }
        self.mirror.enqueue(SyncItem::Message {
            conversation_id: user_id.to_string(),
            message,
        });

        Ok(OperatorSendResult {
            channel_message_id: receipt.channel_message_id,
            is_duplicate: false,
        })
    }
}
