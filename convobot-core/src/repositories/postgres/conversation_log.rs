// src/repositories/postgres/conversation_log.rs

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use convobot_common::models::message::{LocatedMessage, Message, Reaction};
use convobot_common::traits::repository_traits::ConversationLogRepo;
use crate::Error;

const DEDUP_KEY_IDX: &str = "conversation_messages_dedup_key_idx";
const CHANNEL_ID_IDX: &str = "conversation_messages_channel_id_idx";
const POSITION_IDX: &str = "conversation_messages_position_idx";

/// Two appends to the same conversation may race on the computed position;
/// the unique index rejects one and we recompute. More than a couple of
/// retries means something else is wrong.
const APPEND_RETRIES: u32 = 3;

const MESSAGE_COLUMNS: &str = r#"
    message_id, conversation_id, position, channel_message_id, direction,
    sent_at, text_content, attachment, reaction, ai_audit,
    client_dedup_key, operator_id, operator_name
"#;

pub struct PostgresConversationLogRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresConversationLogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &PgRow) -> Result<Message, Error> {
    let attachment: Option<serde_json::Value> = row.try_get("attachment")?;
    let reaction: Option<serde_json::Value> = row.try_get("reaction")?;
    let ai_audit: Option<serde_json::Value> = row.try_get("ai_audit")?;
    Ok(Message {
        message_id: row.try_get::<Uuid, _>("message_id")?,
        channel_message_id: row.try_get("channel_message_id")?,
        direction: row.try_get("direction")?,
        timestamp: row.try_get("sent_at")?,
        text_content: row.try_get("text_content")?,
        attachment: attachment.map(serde_json::from_value).transpose()?,
        reaction: reaction.map(serde_json::from_value).transpose()?,
        ai_audit: ai_audit.map(serde_json::from_value).transpose()?,
        client_dedup_key: row.try_get("client_dedup_key")?,
        operator_id: row.try_get("operator_id")?,
        operator_name: row.try_get("operator_name")?,
    })
}

/// Maps unique violations on the ledger's constraints to the duplicate
/// signal the services understand. Position collisions stay retryable.
fn violated_constraint(e: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db) = e {
        if db.is_unique_violation() {
            return db.constraint().map(str::to_string);
        }
    }
    None
}

#[async_trait]
impl ConversationLogRepo for PostgresConversationLogRepository {
    async fn append_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<i64, Error> {
        let sql = r#"
            INSERT INTO conversation_messages (
                message_id, conversation_id, position, channel_message_id,
                direction, sent_at, text_content, attachment, reaction,
                ai_audit, client_dedup_key, operator_id, operator_name
            )
            SELECT $1, $2, COALESCE(MAX(position) + 1, 0), $3, $4, $5, $6,
                   $7, $8, $9, $10, $11, $12
            FROM conversation_messages
            WHERE conversation_id = $2
            RETURNING position
        "#;

        let attachment = message
            .attachment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let reaction = message
            .reaction
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let ai_audit = message
            .ai_audit
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let mut attempt = 0;
        loop {
            let result = sqlx::query(sql)
                .bind(message.message_id)
                .bind(conversation_id)
                .bind(&message.channel_message_id)
                .bind(message.direction)
                .bind(message.timestamp)
                .bind(&message.text_content)
                .bind(&attachment)
                .bind(&reaction)
                .bind(&ai_audit)
                .bind(&message.client_dedup_key)
                .bind(&message.operator_id)
                .bind(&message.operator_name)
                .fetch_one(&self.pool)
                .await;

            match result {
                Ok(row) => return Ok(row.try_get("position")?),
                Err(e) => match violated_constraint(&e).as_deref() {
                    Some(DEDUP_KEY_IDX) => {
                        return Err(Error::DuplicateOperation(format!(
                            "dedup key '{}' already used in conversation '{}'",
                            message.client_dedup_key.as_deref().unwrap_or(""),
                            conversation_id
                        )));
                    }
                    Some(CHANNEL_ID_IDX) => {
                        return Err(Error::DuplicateOperation(format!(
                            "channel message '{}' already stored in conversation '{}'",
                            message.channel_message_id, conversation_id
                        )));
                    }
                    Some(POSITION_IDX) if attempt < APPEND_RETRIES => {
                        attempt += 1;
                        debug!(
                            "append position collision on '{}', retry {}",
                            conversation_id, attempt
                        );
                    }
                    _ => return Err(Error::Database(e)),
                },
            }
        }
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, Error> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM conversation_messages
            WHERE conversation_id = $1
            ORDER BY position DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn find_by_dedup_key(
        &self,
        conversation_id: &str,
        client_dedup_key: &str,
    ) -> Result<Option<Message>, Error> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM conversation_messages
            WHERE conversation_id = $1 AND client_dedup_key = $2
            "#
        );
        let row = sqlx::query(&sql)
            .bind(conversation_id)
            .bind(client_dedup_key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(row_to_message(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_message_by_channel_id(
        &self,
        channel_message_id: &str,
    ) -> Result<Option<LocatedMessage>, Error> {
        // Cross-conversation scan; one consistent read, bounded by the
        // per-conversation channel-id uniqueness.
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM conversation_messages
            WHERE channel_message_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(channel_message_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => Ok(Some(LocatedMessage {
                conversation_id: r.try_get("conversation_id")?,
                position: r.try_get("position")?,
                message: row_to_message(&r)?,
            })),
            None => Ok(None),
        }
    }

    async fn update_reaction(
        &self,
        conversation_id: &str,
        position: i64,
        reaction: Option<&Reaction>,
    ) -> Result<(), Error> {
        let value = reaction.map(serde_json::to_value).transpose()?;
        let done = sqlx::query(
            r#"
            UPDATE conversation_messages
            SET reaction = $3
            WHERE conversation_id = $1 AND position = $2
            "#,
        )
        .bind(conversation_id)
        .bind(position)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "message at position {} in conversation '{}'",
                position, conversation_id
            )));
        }
        Ok(())
    }
}
