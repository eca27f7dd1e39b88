// File: convobot-common/src/models/mod.rs
pub mod event;
pub mod message;
pub mod sync;
pub mod user_profile;

pub use event::{EventPayload, NormalizedEvent};
pub use message::{
    AiAudit, Attachment, AttachmentKind, LocatedMessage, Message, MessageDirection, Reaction,
};
pub use sync::{SyncItem, SyncStatsSnapshot};
pub use user_profile::{
    ConversationStatus, HandoffRecord, MessageMetrics, NewUserProfile, UserProfile,
};
