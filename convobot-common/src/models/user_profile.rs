// File: convobot-common/src/models/user_profile.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who currently owns outbound replies for a conversation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "lowercase")]
pub enum ConversationStatus {
    Ai,
    Human,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Ai => write!(f, "ai"),
            ConversationStatus::Human => write!(f, "human"),
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ai" => Ok(ConversationStatus::Ai),
            "human" => Ok(ConversationStatus::Human),
            _ => Err(format!("Unknown conversation status: {}", s)),
        }
    }
}

/// One takeover/release stamp, retained for audit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HandoffRecord {
    pub timestamp: DateTime<Utc>,
    pub operator_id: String,
    pub operator_name: String,
}

/// Per-party message counters. One each for the user, the AI and the
/// human operators.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct MessageMetrics {
    pub message_count: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Aggregate root: one per external conversation identity.
///
/// `total_message_count` always equals the sum of the three counters; the
/// store maintains that in the same statement as every counter increment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub contact_address: Option<String>,
    pub conversation_status: ConversationStatus,
    /// Last/current human operator. Never cleared on handback.
    pub assigned_operator_id: Option<String>,
    pub assigned_operator_name: Option<String>,
    pub last_handoff_to_human: Option<HandoffRecord>,
    pub last_handoff_to_ai: Option<HandoffRecord>,
    pub is_active: bool,
    pub user_metrics: MessageMetrics,
    pub ai_metrics: MessageMetrics,
    pub operator_metrics: MessageMetrics,
    pub total_message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Checks the counter-sum invariant. The store upholds it; this exists
    /// for assertions and reconciliation tooling.
    pub fn counters_consistent(&self) -> bool {
        self.total_message_count
            == self.user_metrics.message_count
                + self.ai_metrics.message_count
                + self.operator_metrics.message_count
    }
}

/// Seed fields for the race-safe find-or-create upsert.
#[derive(Debug, Clone, Default)]
pub struct NewUserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub contact_address: Option<String>,
}
