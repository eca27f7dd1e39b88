// File: convobot-core/src/runtime.rs
//
// Explicit construction and lifecycle for the whole core: no module-level
// singletons, everything injected and shut down in order.

use std::sync::Arc;

use tracing::info;

use convobot_common::models::event::NormalizedEvent;
use convobot_common::models::sync::SyncStatsSnapshot;
use convobot_common::traits::collaborator_traits::{
    AiAgent, ChannelTransport, GeoEnrichment, MediaProcessor, MirrorStore,
};
use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};

use crate::config::CoreConfig;
use crate::db::Database;
use crate::repositories::postgres::{
    PostgresConversationLogRepository, PostgresUserProfileRepository,
};
use crate::services::{
    ConversationService, ConversationStatusResult, MessageIngestionService,
    OperatorMessageService, OperatorSendResult,
};
use crate::sync::MirrorSyncPipeline;
use crate::Error;

/// The injected external collaborators. Everything the core talks to besides
/// its own stores comes in through here.
pub struct Collaborators {
    pub channel: Arc<dyn ChannelTransport>,
    pub media: Arc<dyn MediaProcessor>,
    pub ai: Arc<dyn AiAgent>,
    pub geo: Arc<dyn GeoEnrichment>,
    pub mirror_store: Arc<dyn MirrorStore>,
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MirrorHealth {
    pub healthy: bool,
    pub stats: SyncStatsSnapshot,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub primary: ComponentHealth,
    pub mirror: MirrorHealth,
}

/// The assembled core. Owns the primary store handle, the repositories, the
/// three services and the mirror pipeline.
pub struct CoreRuntime {
    db: Database,
    conversations: ConversationService,
    ingestion: MessageIngestionService,
    operator_messages: OperatorMessageService,
    mirror: Arc<MirrorSyncPipeline>,
}

impl CoreRuntime {
    /// Connects to the primary store, runs migrations, spawns the mirror
    /// pipeline and wires the services.
    pub async fn initialize(
        config: CoreConfig,
        collaborators: Collaborators,
    ) -> Result<Self, Error> {
        let db = Database::new(&config.database_url, config.max_connections).await?;
        db.migrate().await?;

        let profile_repo: Arc<dyn UserProfileRepo> =
            Arc::new(PostgresUserProfileRepository::new(db.pool().clone()));
        let log_repo: Arc<dyn ConversationLogRepo> =
            Arc::new(PostgresConversationLogRepository::new(db.pool().clone()));

        Ok(Self::from_parts(db, profile_repo, log_repo, config, collaborators))
    }

    /// Wires services onto already-constructed stores. Lets tests swap in
    /// in-memory repositories.
    pub fn from_parts(
        db: Database,
        profile_repo: Arc<dyn UserProfileRepo>,
        log_repo: Arc<dyn ConversationLogRepo>,
        config: CoreConfig,
        collaborators: Collaborators,
    ) -> Self {
        let mirror = MirrorSyncPipeline::spawn(collaborators.mirror_store, config.mirror.clone());

        let conversations = ConversationService::new(Arc::clone(&profile_repo));
        let ingestion = MessageIngestionService::new(
            Arc::clone(&profile_repo),
            Arc::clone(&log_repo),
            Arc::clone(&collaborators.channel),
            collaborators.media,
            collaborators.ai,
            collaborators.geo,
            Arc::clone(&mirror),
            config.ai_timeout,
            config.ai_fallback_reply.clone(),
            config.ai_checkpoint.clone(),
        );
        let operator_messages = OperatorMessageService::new(
            profile_repo,
            log_repo,
            collaborators.channel,
            Arc::clone(&mirror),
        );

        info!("core runtime assembled");
        Self {
            db,
            conversations,
            ingestion,
            operator_messages,
            mirror,
        }
    }

    // --- the stable operations boundary ---

    pub async fn ingest_event(&self, event: &NormalizedEvent) -> Result<(), Error> {
        self.ingestion.ingest_event(event).await
    }

    pub async fn ingest_batch(&self, events: &[NormalizedEvent]) -> Result<(), Error> {
        self.ingestion.ingest_batch(events).await
    }

    pub async fn takeover_conversation(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
    ) -> Result<ConversationStatusResult, Error> {
        self.conversations
            .takeover(user_id, operator_id, operator_name)
            .await
    }

    pub async fn release_conversation(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
    ) -> Result<ConversationStatusResult, Error> {
        self.conversations
            .release(user_id, operator_id, operator_name)
            .await
    }

    pub async fn conversation_status(
        &self,
        user_id: &str,
    ) -> Result<ConversationStatusResult, Error> {
        self.conversations.status(user_id).await
    }

    pub async fn send_operator_message(
        &self,
        user_id: &str,
        operator_id: &str,
        operator_name: &str,
        text: &str,
        client_dedup_key: &str,
    ) -> Result<OperatorSendResult, Error> {
        self.operator_messages
            .send_operator_message(user_id, operator_id, operator_name, text, client_dedup_key)
            .await
    }

    /// Primary liveness plus mirror pipeline counters and secondary-store
    /// liveness. Mirror problems never make the report an error; they show as
    /// unhealthy components.
    pub async fn health_check(&self) -> HealthReport {
        let primary = match self.db.ping().await {
            Ok(()) => ComponentHealth {
                healthy: true,
                detail: None,
            },
            Err(e) => ComponentHealth {
                healthy: false,
                detail: Some(e.to_string()),
            },
        };
        let stats = self.mirror.stats();
        let mirror = match self.mirror.ping_store().await {
            Ok(()) => MirrorHealth {
                healthy: true,
                stats,
                detail: None,
            },
            Err(e) => MirrorHealth {
                healthy: false,
                stats,
                detail: Some(e.to_string()),
            },
        };
        HealthReport { primary, mirror }
    }

    /// Stops the mirror worker (draining its queue) and closes the pool.
    pub async fn shutdown(&self) {
        self.mirror.shutdown().await;
        self.db.close().await;
        info!("core runtime stopped");
    }
}
