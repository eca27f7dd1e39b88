// ================================================================
// File: convobot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Raised by the store when an insert collides with an existing
    /// `client_dedup_key` or `channel_message_id`. The services map this to a
    /// duplicate-detected success, it is never surfaced to callers as-is.
    #[error("Duplicate operation: {0}")]
    DuplicateOperation(String),

    #[error("Upstream collaborator error: {0}")]
    Upstream(String),

    /// The channel send succeeded but the ledger write did not. Carries the
    /// channel-level message id so the caller can reconcile.
    #[error("Message sent (channel id {channel_message_id}) but not recorded: {detail}")]
    PartialSend {
        channel_message_id: String,
        detail: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// True when the error is the store signalling an already-seen insert.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::DuplicateOperation(_))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
