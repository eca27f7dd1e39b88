// File: convobot-core/src/services/conversation_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use convobot_common::models::user_profile::{ConversationStatus, NewUserProfile, UserProfile};
use convobot_common::traits::repository_traits::UserProfileRepo;
use convobot_common::validate;
use crate::Error;

/// Read-only projection of a conversation's ownership state, returned by all
/// control operations.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationStatusResult {
    pub user_id: String,
    pub status: ConversationStatus,
    pub assigned_operator_id: Option<String>,
    pub assigned_operator_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserProfile> for ConversationStatusResult {
    fn from(p: &UserProfile) -> Self {
        Self {
            user_id: p.user_id.clone(),
            status: p.conversation_status,
            assigned_operator_id: p.assigned_operator_id.clone(),
            assigned_operator_name: p.assigned_operator_name.clone(),
            updated_at: p.updated_at,
        }
    }
}

/// The AI <-> human-operator state machine. Both states are always reachable;
/// the rules here are authorization rules, not transition legality.
pub struct ConversationService {
    profile_repo: Arc<dyn UserProfileRepo>,
}

impl ConversationService {
    pub fn new(profile_repo: Arc<dyn UserProfileRepo>) -> Self {
        Self { profile_repo }
    }

    /// Puts a human operator in charge of the conversation, creating the
    /// profile if the user has never been seen.
    ///
    /// Re-takeover while already HUMAN is permitted as a reassignment so
    /// operators cannot get stuck; it is logged, not rejected.
    pub async fn takeover(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
    ) -> Result<ConversationStatusResult, Error> {
        validate::validate_user_id(user_id)?;
        require_operator(operator_id)?;

        let existing = self
            .profile_repo
            .find_or_create(&NewUserProfile {
                user_id: user_id.to_string(),
                ..Default::default()
            })
            .await?;

        if existing.conversation_status == ConversationStatus::Human {
            match existing.assigned_operator_id.as_deref() {
                Some(prev) if prev != operator_id => {
                    warn!(
                        "conversation '{}' reassigned from operator '{}' to '{}'",
                        user_id, prev, operator_id
                    );
                }
                _ => {
                    warn!(
                        "operator '{}' took over conversation '{}' which was already HUMAN",
                        operator_id, user_id
                    );
                }
            }
        }

        let updated = self
            .profile_repo
            .record_takeover(user_id, operator_id, operator_name, Utc::now())
            .await?;
        info!(
            "conversation '{}' now owned by operator '{}'",
            user_id, operator_id
        );
        Ok(ConversationStatusResult::from(&updated))
    }

    /// Hands the conversation back to the AI.
    ///
    /// Only the assigned operator may release. Releasing an already-AI
    /// conversation succeeds idempotently with no state change. The operator
    /// assignment is never cleared; it stays behind for attribution.
    pub async fn release(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
    ) -> Result<ConversationStatusResult, Error> {
        validate::validate_user_id(user_id)?;
        require_operator(operator_id)?;

        let profile = self
            .profile_repo
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;

        if let Some(assigned) = profile.assigned_operator_id.as_deref() {
            if assigned != operator_id {
                return Err(Error::Unauthorized(format!(
                    "only the assigned operator ('{}') may release conversation '{}'",
                    assigned, user_id
                )));
            }
        }

        if profile.conversation_status == ConversationStatus::Ai {
            return Ok(ConversationStatusResult::from(&profile));
        }

        let updated = self
            .profile_repo
            .record_release(user_id, operator_id, operator_name, Utc::now())
            .await?;
        info!(
            "conversation '{}' handed back to AI by operator '{}'",
            user_id, operator_id
        );
        Ok(ConversationStatusResult::from(&updated))
    }

    pub async fn status(&self, user_id: &str) -> Result<ConversationStatusResult, Error> {
        validate::validate_user_id(user_id)?;
        let profile = self
            .profile_repo
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user profile '{}'", user_id)))?;
        Ok(ConversationStatusResult::from(&profile))
    }
}

fn require_operator(operator_id: &str) -> Result<(), Error> {
    if operator_id.trim().is_empty() {
        return Err(Error::Validation("operator id must not be empty".into()));
    }
    Ok(())
}
