// File: convobot-core/src/repositories/mod.rs
pub mod postgres;

pub use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};
