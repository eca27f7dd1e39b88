// src/repositories/postgres/user_profile.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use convobot_common::models::message::MessageDirection;
use convobot_common::models::user_profile::{
    ConversationStatus, HandoffRecord, MessageMetrics, NewUserProfile, UserProfile,
};
use convobot_common::traits::repository_traits::UserProfileRepo;
use crate::Error;

const PROFILE_COLUMNS: &str = r#"
    user_id, display_name, contact_address, conversation_status,
    assigned_operator_id, assigned_operator_name,
    human_handoff_at, human_handoff_operator_id, human_handoff_operator_name,
    ai_handoff_at, ai_handoff_operator_id, ai_handoff_operator_name,
    is_active,
    user_message_count, user_last_message, user_last_message_at,
    ai_message_count, ai_last_message, ai_last_message_at,
    operator_message_count, operator_last_message, operator_last_message_at,
    total_message_count, created_at, updated_at
"#;

pub struct PostgresUserProfileRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresUserProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn handoff_from_row(
    row: &PgRow,
    at_col: &str,
    id_col: &str,
    name_col: &str,
) -> Result<Option<HandoffRecord>, Error> {
    let at: Option<DateTime<Utc>> = row.try_get(at_col)?;
    let operator_id: Option<String> = row.try_get(id_col)?;
    match (at, operator_id) {
        (Some(timestamp), Some(operator_id)) => Ok(Some(HandoffRecord {
            timestamp,
            operator_id,
            operator_name: row
                .try_get::<Option<String>, _>(name_col)?
                .unwrap_or_default(),
        })),
        _ => Ok(None),
    }
}

fn row_to_profile(row: &PgRow) -> Result<UserProfile, Error> {
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        display_name: row.try_get("display_name")?,
        contact_address: row.try_get("contact_address")?,
        conversation_status: row.try_get("conversation_status")?,
        assigned_operator_id: row.try_get("assigned_operator_id")?,
        assigned_operator_name: row.try_get("assigned_operator_name")?,
        last_handoff_to_human: handoff_from_row(
            row,
            "human_handoff_at",
            "human_handoff_operator_id",
            "human_handoff_operator_name",
        )?,
        last_handoff_to_ai: handoff_from_row(
            row,
            "ai_handoff_at",
            "ai_handoff_operator_id",
            "ai_handoff_operator_name",
        )?,
        is_active: row.try_get("is_active")?,
        user_metrics: MessageMetrics {
            message_count: row.try_get("user_message_count")?,
            last_message: row.try_get("user_last_message")?,
            last_message_at: row.try_get("user_last_message_at")?,
        },
        ai_metrics: MessageMetrics {
            message_count: row.try_get("ai_message_count")?,
            last_message: row.try_get("ai_last_message")?,
            last_message_at: row.try_get("ai_last_message_at")?,
        },
        operator_metrics: MessageMetrics {
            message_count: row.try_get("operator_message_count")?,
            last_message: row.try_get("operator_last_message")?,
            last_message_at: row.try_get("operator_last_message_at")?,
        },
        total_message_count: row.try_get("total_message_count")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl UserProfileRepo for PostgresUserProfileRepository {
    async fn find_or_create(&self, seed: &NewUserProfile) -> Result<UserProfile, Error> {
        // Atomic upsert: when two ingestions race to create the same id,
        // exactly one INSERT wins and the loser's DO UPDATE observes the
        // winner's row. Existing rows keep their current display name.
        let sql = format!(
            r#"
            INSERT INTO user_profiles (user_id, display_name, contact_address)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
                SET display_name = COALESCE(user_profiles.display_name, EXCLUDED.display_name),
                    contact_address = COALESCE(user_profiles.contact_address, EXCLUDED.contact_address)
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&seed.user_id)
            .bind(&seed.display_name)
            .bind(&seed.contact_address)
            .fetch_one(&self.pool)
            .await?;
        row_to_profile(&row)
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, Error> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(row_to_profile(&r)?)),
            None => Ok(None),
        }
    }

    async fn update_metrics(
        &self,
        user_id: &str,
        direction: MessageDirection,
        text: &str,
        delta: i64,
    ) -> Result<UserProfile, Error> {
        // One statement per direction so the counter, the total and the
        // last-message stamp move together.
        let prefix = match direction {
            MessageDirection::Inbound => "user",
            MessageDirection::OutboundAi => "ai",
            MessageDirection::OutboundOperator => "operator",
        };
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET {prefix}_message_count = {prefix}_message_count + $2,
                total_message_count = total_message_count + $2,
                {prefix}_last_message = $3,
                {prefix}_last_message_at = $4,
                updated_at = $4
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(delta)
            .bind(text)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => row_to_profile(&r),
            None => Err(Error::NotFound(format!("user profile '{}'", user_id))),
        }
    }

    async fn set_conversation_status(
        &self,
        user_id: &str,
        status: ConversationStatus,
    ) -> Result<UserProfile, Error> {
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET conversation_status = $2, updated_at = $3
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(status)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => row_to_profile(&r),
            None => Err(Error::NotFound(format!("user profile '{}'", user_id))),
        }
    }

    async fn record_takeover(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error> {
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET conversation_status = 'human',
                assigned_operator_id = $2,
                assigned_operator_name = $3,
                human_handoff_at = $4,
                human_handoff_operator_id = $2,
                human_handoff_operator_name = $3,
                updated_at = $4
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(operator_id)
            .bind(operator_name)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => row_to_profile(&r),
            None => Err(Error::NotFound(format!("user profile '{}'", user_id))),
        }
    }

    async fn record_release(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        at: DateTime<Utc>,
    ) -> Result<UserProfile, Error> {
        // The operator assignment is deliberately left in place for audit.
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET conversation_status = 'ai',
                ai_handoff_at = $4,
                ai_handoff_operator_id = $2,
                ai_handoff_operator_name = $3,
                updated_at = $4
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(operator_id)
            .bind(operator_name)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => row_to_profile(&r),
            None => Err(Error::NotFound(format!("user profile '{}'", user_id))),
        }
    }

    async fn deactivate(&self, user_id: &str) -> Result<UserProfile, Error> {
        let sql = format!(
            r#"
            UPDATE user_profiles
            SET is_active = FALSE, updated_at = $2
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => row_to_profile(&r),
            None => Err(Error::NotFound(format!("user profile '{}'", user_id))),
        }
    }
}
