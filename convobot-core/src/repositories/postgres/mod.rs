// File: convobot-core/src/repositories/postgres/mod.rs
pub mod conversation_log;
pub mod user_profile;

pub use conversation_log::PostgresConversationLogRepository;
pub use user_profile::PostgresUserProfileRepository;
