// File: convobot-core/src/config.rs

use std::str::FromStr;
use std::time::Duration;

use crate::sync::MirrorSyncConfig;
use crate::Error;

const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, I can't answer right now. A human will follow up shortly.";

/// Environment-driven settings for the core. Everything except
/// `DATABASE_URL` has a sensible default.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Time box for one AI collaborator call.
    pub ai_timeout: Duration,
    /// Sent to the user when the AI fails both attempts.
    pub ai_fallback_reply: String,
    /// Recorded in the `ai_audit` of every AI reply.
    pub ai_checkpoint: String,
    pub mirror: MirrorSyncConfig,
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Validation("DATABASE_URL must be set".into()))?;

        Ok(Self {
            database_url,
            max_connections: env_parse("DB_MAX_CONNECTIONS", 5),
            ai_timeout: Duration::from_millis(env_parse("AI_TIMEOUT_MS", 20_000)),
            ai_fallback_reply: std::env::var("AI_FALLBACK_REPLY")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_REPLY.to_string()),
            ai_checkpoint: std::env::var("AI_CHECKPOINT")
                .unwrap_or_else(|_| "default".to_string()),
            mirror: MirrorSyncConfig {
                queue_capacity: env_parse("MIRROR_QUEUE_CAPACITY", 10_000),
                batch_size: env_parse("MIRROR_BATCH_SIZE", 100),
                flush_interval: Duration::from_millis(env_parse("MIRROR_FLUSH_INTERVAL_MS", 2_000)),
                batch_pause: Duration::from_millis(env_parse("MIRROR_BATCH_PAUSE_MS", 50)),
            },
        })
    }

    /// Config for a given database URL with defaults everywhere else,
    /// used by tests and embedded setups.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            ai_timeout: Duration::from_secs(20),
            ai_fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            ai_checkpoint: "default".to_string(),
            mirror: MirrorSyncConfig::default(),
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
