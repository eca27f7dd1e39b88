// File: convobot-core/tests/repository_tests.rs
//
// Postgres-backed repository tests. Ignored by default; run with
// `cargo test -- --ignored` against a database reachable via
// TEST_DATABASE_URL (defaults to postgres://convobot@localhost/convobot_test).

use std::sync::Arc;

use chrono::Utc;

use convobot_common::models::message::{Message, MessageDirection, Reaction};
use convobot_common::models::user_profile::{ConversationStatus, NewUserProfile};
use convobot_core::repositories::postgres::{
    PostgresConversationLogRepository, PostgresUserProfileRepository,
};
use convobot_core::test_utils::helpers::setup_test_database;
use convobot_core::test_utils::memory::{
    NullGeo, RecordingChannel, RecordingMirrorStore, StaticAi, StaticMedia,
};
use convobot_core::{Collaborators, CoreConfig, CoreRuntime, Error};
use convobot_common::traits::repository_traits::{ConversationLogRepo, UserProfileRepo};

const USER: &str = "15551234567";

fn seed() -> NewUserProfile {
    NewUserProfile {
        user_id: USER.to_string(),
        display_name: Some("Test User".to_string()),
        contact_address: None,
    }
}

fn inbound(channel_message_id: &str, text: &str) -> Message {
    Message::new(
        channel_message_id.to_string(),
        MessageDirection::Inbound,
        Utc::now(),
        text.to_string(),
    )
}

#[tokio::test]
#[ignore]
async fn find_or_create_is_an_upsert() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let repo = PostgresUserProfileRepository::new(db.pool().clone());

    let first = repo.find_or_create(&seed()).await?;
    assert_eq!(first.conversation_status, ConversationStatus::Ai);
    assert_eq!(first.total_message_count, 0);

    let second = repo.find_or_create(&seed()).await?;
    assert_eq!(second.created_at, first.created_at);

    // A later event may carry the display name a first contact lacked.
    let bare = NewUserProfile {
        user_id: "15550000001".to_string(),
        ..Default::default()
    };
    let created = repo.find_or_create(&bare).await?;
    assert!(created.display_name.is_none());
    let named = repo
        .find_or_create(&NewUserProfile {
            display_name: Some("Late Name".to_string()),
            ..bare
        })
        .await?;
    assert_eq!(named.display_name.as_deref(), Some("Late Name"));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn metric_updates_keep_the_counter_sum() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let repo = PostgresUserProfileRepository::new(db.pool().clone());
    repo.find_or_create(&seed()).await?;

    repo.update_metrics(USER, MessageDirection::Inbound, "hi", 1).await?;
    repo.update_metrics(USER, MessageDirection::OutboundAi, "hello!", 1).await?;
    let profile = repo
        .update_metrics(USER, MessageDirection::OutboundOperator, "Lena here", 1)
        .await?;

    assert_eq!(profile.user_metrics.message_count, 1);
    assert_eq!(profile.ai_metrics.message_count, 1);
    assert_eq!(profile.operator_metrics.message_count, 1);
    assert_eq!(profile.total_message_count, 3);
    assert!(profile.counters_consistent());
    assert_eq!(profile.operator_metrics.last_message.as_deref(), Some("Lena here"));

    let err = repo
        .update_metrics("19990000000", MessageDirection::Inbound, "hi", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn takeover_and_release_stamp_handoffs() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let repo = PostgresUserProfileRepository::new(db.pool().clone());
    repo.find_or_create(&seed()).await?;

    let taken = repo.record_takeover(USER, "lm-7", "Lena", Utc::now()).await?;
    assert_eq!(taken.conversation_status, ConversationStatus::Human);
    assert_eq!(taken.assigned_operator_id.as_deref(), Some("lm-7"));
    let handoff = taken.last_handoff_to_human.as_ref().expect("handoff record");
    assert_eq!(handoff.operator_id, "lm-7");
    assert_eq!(handoff.operator_name, "Lena");

    let released = repo.record_release(USER, "lm-7", "Lena", Utc::now()).await?;
    assert_eq!(released.conversation_status, ConversationStatus::Ai);
    // Assignment is retained for attribution.
    assert_eq!(released.assigned_operator_id.as_deref(), Some("lm-7"));
    assert!(released.last_handoff_to_ai.is_some());

    Ok(())
}

#[tokio::test]
#[ignore]
async fn conversation_status_can_be_set_directly() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let repo = PostgresUserProfileRepository::new(db.pool().clone());
    repo.find_or_create(&seed()).await?;

    let profile = repo
        .set_conversation_status(USER, ConversationStatus::Human)
        .await?;
    assert_eq!(profile.conversation_status, ConversationStatus::Human);
    // Unlike record_takeover, no assignment or handoff stamp is written.
    assert!(profile.assigned_operator_id.is_none());
    assert!(profile.last_handoff_to_human.is_none());

    let profile = repo
        .set_conversation_status(USER, ConversationStatus::Ai)
        .await?;
    assert_eq!(profile.conversation_status, ConversationStatus::Ai);

    let err = repo
        .set_conversation_status("19990000000", ConversationStatus::Ai)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn deactivate_flips_the_active_flag() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let repo = PostgresUserProfileRepository::new(db.pool().clone());
    repo.find_or_create(&seed()).await?;

    let profile = repo.deactivate(USER).await?;
    assert!(!profile.is_active);

    Ok(())
}

#[tokio::test]
#[ignore]
async fn appends_get_sequential_positions() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let profiles = PostgresUserProfileRepository::new(db.pool().clone());
    let log = PostgresConversationLogRepository::new(db.pool().clone());
    profiles.find_or_create(&seed()).await?;

    assert_eq!(log.append_message(USER, &inbound("cm-1", "first")).await?, 0);
    assert_eq!(log.append_message(USER, &inbound("cm-2", "second")).await?, 1);
    assert_eq!(log.append_message(USER, &inbound("cm-3", "third")).await?, 2);

    let listed = log.list_messages(USER).await?;
    assert_eq!(listed.len(), 3);
    // Newest first.
    assert_eq!(listed[0].text_content, "third");
    assert_eq!(listed[2].text_content, "first");

    Ok(())
}

#[tokio::test]
#[ignore]
async fn ledger_uniqueness_maps_to_duplicate_signal() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let profiles = PostgresUserProfileRepository::new(db.pool().clone());
    let log = PostgresConversationLogRepository::new(db.pool().clone());
    profiles.find_or_create(&seed()).await?;

    let mut keyed = inbound("cm-1", "keyed");
    keyed.direction = MessageDirection::OutboundOperator;
    keyed.client_dedup_key = Some("req-1".to_string());
    log.append_message(USER, &keyed).await?;

    // Same dedup key, fresh channel id: rejected as a duplicate operation.
    let mut retry = inbound("cm-2", "keyed");
    retry.direction = MessageDirection::OutboundOperator;
    retry.client_dedup_key = Some("req-1".to_string());
    let err = log.append_message(USER, &retry).await.unwrap_err();
    assert!(err.is_duplicate(), "got {:?}", err);

    // Same channel id: webhook redelivery shape.
    let err = log.append_message(USER, &inbound("cm-1", "again")).await.unwrap_err();
    assert!(err.is_duplicate(), "got {:?}", err);

    let found = log.find_by_dedup_key(USER, "req-1").await?.expect("keyed message");
    assert_eq!(found.channel_message_id, "cm-1");
    assert!(log.find_by_dedup_key(USER, "req-2").await?.is_none());

    Ok(())
}

#[tokio::test]
#[ignore]
async fn reactions_update_in_place() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let profiles = PostgresUserProfileRepository::new(db.pool().clone());
    let log = PostgresConversationLogRepository::new(db.pool().clone());
    profiles.find_or_create(&seed()).await?;
    log.append_message(USER, &inbound("cm-1", "react to me")).await?;

    let located = log
        .find_message_by_channel_id("cm-1")
        .await?
        .expect("located message");
    assert_eq!(located.conversation_id, USER);
    assert_eq!(located.position, 0);

    let reaction = Reaction {
        emoji: "👍".to_string(),
        timestamp: Utc::now(),
        reactor_id: USER.to_string(),
    };
    log.update_reaction(USER, located.position, Some(&reaction)).await?;
    let listed = log.list_messages(USER).await?;
    assert_eq!(listed[0].reaction.as_ref().map(|r| r.emoji.as_str()), Some("👍"));

    log.update_reaction(USER, located.position, None).await?;
    let listed = log.list_messages(USER).await?;
    assert!(listed[0].reaction.is_none());

    let err = log.update_reaction(USER, 42, None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn attachments_and_audit_round_trip_through_the_store() -> anyhow::Result<()> {
    use convobot_common::models::message::{AiAudit, Attachment, AttachmentKind};

    let db = setup_test_database().await?;
    let profiles = PostgresUserProfileRepository::new(db.pool().clone());
    let log = PostgresConversationLogRepository::new(db.pool().clone());
    profiles.find_or_create(&seed()).await?;

    let mut message = inbound("cm-1", "[IMAGE] sunset");
    message.attachment = Some(Attachment {
        kind: AttachmentKind::Image {
            width: Some(640),
            height: Some(480),
        },
        url: Some("https://media.test/cm-1".to_string()),
        storage_path: Some("media/cm-1".to_string()),
        mime_type: Some("image/jpeg".to_string()),
        file_name: None,
        file_size: Some(1024),
    });
    message.ai_audit = Some(AiAudit {
        checkpoint_id: "checkpoint-7".to_string(),
        processing_ms: 12,
    });
    log.append_message(USER, &message).await?;

    let stored = &log.list_messages(USER).await?[0];
    let attachment = stored.attachment.as_ref().expect("attachment");
    assert_eq!(attachment.url.as_deref(), Some("https://media.test/cm-1"));
    assert!(matches!(
        attachment.kind,
        AttachmentKind::Image {
            width: Some(640),
            height: Some(480)
        }
    ));
    assert_eq!(
        stored.ai_audit.as_ref().map(|a| a.checkpoint_id.as_str()),
        Some("checkpoint-7")
    );

    Ok(())
}

#[tokio::test]
#[ignore]
async fn runtime_assembles_and_reports_healthy() -> anyhow::Result<()> {
    let db = setup_test_database().await?;
    let profile_repo = Arc::new(PostgresUserProfileRepository::new(db.pool().clone()));
    let log_repo = Arc::new(PostgresConversationLogRepository::new(db.pool().clone()));

    let runtime = CoreRuntime::from_parts(
        db,
        profile_repo,
        log_repo,
        CoreConfig::with_database_url("unused://from_parts"),
        Collaborators {
            channel: Arc::new(RecordingChannel::new()),
            media: Arc::new(StaticMedia),
            ai: Arc::new(StaticAi::replying("hello!")),
            geo: Arc::new(NullGeo),
            mirror_store: Arc::new(RecordingMirrorStore::new()),
        },
    );

    runtime.takeover_conversation(USER, "lm-7", "Lena").await?;
    let status = runtime.conversation_status(USER).await?;
    assert_eq!(status.status, ConversationStatus::Human);

    let report = runtime.health_check().await;
    assert!(report.primary.healthy);
    assert!(report.mirror.healthy);
    assert_eq!(report.mirror.stats.failed, 0);

    runtime.shutdown().await;
    Ok(())
}
