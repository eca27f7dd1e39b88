// File: convobot-core/src/services/mod.rs

pub mod conversation_service;
pub mod ingestion_service;
pub mod operator_service;

pub use conversation_service::{ConversationService, ConversationStatusResult};
pub use ingestion_service::MessageIngestionService;
pub use operator_service::{OperatorMessageService, OperatorSendResult};
