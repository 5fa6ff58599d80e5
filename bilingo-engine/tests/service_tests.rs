//! Integration tests for the content access service
//!
//! Exercises the gated mutation workflow end to end over an in-memory
//! database: energy gating, charge ordering, mirror drafts, level-ups,
//! daily recharge, stats persistence and search freshness.

use bilingo_common::config::EngineConfig;
use bilingo_common::models::{Category, MirrorKind, MirrorStatus, NewPair, SubtitlePair};
use bilingo_common::{time, Error};
use bilingo_engine::search::SearchMode;
use bilingo_engine::service::{AuthenticatedUser, UpdateRequest};
use bilingo_engine::Engine;
use chrono::Duration;

async fn setup_engine() -> Engine {
    Engine::in_memory(EngineConfig::default()).await.unwrap()
}

async fn insert(engine: &Engine, primary: &str, secondary: &str) -> SubtitlePair {
    engine
        .service()
        .pairs()
        .insert(NewPair {
            primary_text: primary.to_string(),
            secondary_text: secondary.to_string(),
            primary_file: Some("film_en.srt".to_string()),
            secondary_file: Some("film_ru.srt".to_string()),
            primary_time: Some("00:00:01,000 --> 00:00:02,000".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}

async fn set_progression(engine: &Engine, user_id: &str, energy: i64, xp: i64) {
    sqlx::query("UPDATE progression SET energy = ?, xp = ? WHERE user_id = ?")
        .bind(energy)
        .bind(xp)
        .bind(user_id)
        .execute(engine.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_random_on_empty_corpus() {
    let engine = setup_engine().await;
    assert!(engine.service().get_random().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rating_update_charges_one_energy_and_grants_xp() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "good morning", "доброе утро").await;

    let outcome = service
        .apply_update(&user, &pair.id, UpdateRequest::rating(3))
        .await
        .unwrap();

    assert_eq!(outcome.pair.rating, 3);
    assert!(outcome.charged);
    assert!(!outcome.leveled_up);
    assert!(outcome.mirror.is_none());
    assert_eq!(outcome.progression.energy, 9);
    assert_eq!(outcome.progression.xp, 1);
}

#[tokio::test]
async fn test_insufficient_energy_leaves_pair_untouched() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "good morning", "доброе утро").await;
    set_progression(&engine, "alice", 0, 0).await;

    let request = UpdateRequest {
        delta: Some(5),
        category: Some(Category::Idiom),
    };
    let result = service.apply_update(&user, &pair.id, request).await;
    assert!(matches!(result, Err(Error::InsufficientEnergy { .. })));

    let unchanged = service.get_by_id(&pair.id).await.unwrap();
    assert_eq!(unchanged.rating, 0);
    assert_eq!(unchanged.category, Category::None);
    assert!(service.my_mirrors(&user).await.unwrap().is_empty());
    assert_eq!(service.progression(&user).await.unwrap().energy, 0);
}

#[tokio::test]
async fn test_missing_pair_is_not_charged() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();

    let result = service.apply_update(&user, "missing", UpdateRequest::rating(1)).await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let state = service.progression(&user).await.unwrap();
    assert_eq!(state.energy, 10);
    assert_eq!(state.xp, 0);
}

#[tokio::test]
async fn test_empty_request_is_rejected_before_ledger() {
    let engine = setup_engine().await;
    let service = engine.service();
    let pair = insert(&engine, "a", "b").await;

    // Not even provisioned: validation comes first
    let result = service
        .apply_update(&AuthenticatedUser::new("nobody"), &pair.id, UpdateRequest::default())
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_idiom_tag_drafts_mirror_once() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "break a leg", "ни пуха ни пера").await;

    let first = service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Idiom))
        .await
        .unwrap();
    assert_eq!(first.pair.category, Category::Idiom);
    let mirror = first.mirror.expect("draft mirror");
    assert_eq!(mirror.kind, MirrorKind::Idiom);
    assert_eq!(mirror.status, MirrorStatus::Draft);
    assert_eq!(mirror.owner_id, "alice");
    assert_eq!(mirror.source.file.as_deref(), Some("film"));

    // Same tag again toggles off and keeps the existing mirror
    let second = service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Idiom))
        .await
        .unwrap();
    assert_eq!(second.pair.category, Category::None);
    assert!(second.mirror.is_none());

    // Re-tagging finds the mirror already there
    let third = service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Idiom))
        .await
        .unwrap();
    assert!(third.mirror.is_none());
    assert_eq!(service.my_mirrors(&user).await.unwrap().len(), 1);
    assert_eq!(third.progression.energy, 7);
}

#[tokio::test]
async fn test_switching_category_goes_directly() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "to be or not to be", "быть или не быть").await;

    service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Idiom))
        .await
        .unwrap();
    let outcome = service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Quote))
        .await
        .unwrap();

    assert_eq!(outcome.pair.category, Category::Quote);
    assert_eq!(outcome.mirror.map(|m| m.kind), Some(MirrorKind::Quote));
}

#[tokio::test]
async fn test_wrong_tag_creates_no_mirror() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "a", "b").await;

    let outcome = service
        .apply_update(&user, &pair.id, UpdateRequest::category(Category::Wrong))
        .await
        .unwrap();
    assert_eq!(outcome.pair.category, Category::Wrong);
    assert!(outcome.mirror.is_none());
}

#[tokio::test]
async fn test_level_up_through_update() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    set_progression(&engine, "alice", 10, 9).await;
    let pair = insert(&engine, "a", "b").await;

    let outcome = service
        .apply_update(&user, &pair.id, UpdateRequest::rating(1))
        .await
        .unwrap();

    assert!(outcome.leveled_up);
    assert_eq!(outcome.progression.level, 2);
    assert_eq!(outcome.progression.max_energy, 15);
    assert_eq!(outcome.progression.xp, 0);
    assert_eq!(outcome.progression.energy, 9);
}

#[tokio::test]
async fn test_new_day_recharges_before_gating() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "a", "b").await;

    sqlx::query("UPDATE progression SET energy = 0, last_recharge = ? WHERE user_id = 'alice'")
        .bind(time::to_db_string(time::now() - Duration::days(1)))
        .execute(engine.pool())
        .await
        .unwrap();

    let outcome = service
        .apply_update(&user, &pair.id, UpdateRequest::rating(1))
        .await
        .unwrap();
    assert!(outcome.charged);
    assert_eq!(outcome.progression.energy, 9);
}

#[tokio::test]
async fn test_mirror_owner_flow() {
    let engine = setup_engine().await;
    let service = engine.service();
    let alice = AuthenticatedUser::new("alice");
    let bob = AuthenticatedUser::new("bob");
    service.provision("alice").await.unwrap();
    let pair = insert(&engine, "piece of cake", "проще простого").await;

    let mirror = service
        .apply_update(&alice, &pair.id, UpdateRequest::category(Category::Idiom))
        .await
        .unwrap()
        .mirror
        .unwrap();

    assert!(matches!(
        service.publish_mirror(&bob, &mirror.id).await,
        Err(Error::OwnershipViolation { .. })
    ));
    let published = service.publish_mirror(&alice, &mirror.id).await.unwrap();
    assert_eq!(published.status, MirrorStatus::Published);

    let recent = service.recent_mirrors(Some(MirrorKind::Idiom), None).await.unwrap();
    assert_eq!(recent.len(), 1);

    service.delete_mirror(&alice, &mirror.id).await.unwrap();
    assert!(matches!(service.mirror(&mirror.id).await, Err(Error::NotFound(_))));
    assert!(service.recent_mirrors(None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_are_persisted() {
    let engine = setup_engine().await;
    let service = engine.service();

    let empty = service.latest_stats().await.unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.updated_at.is_none());

    insert(&engine, "a", "b").await;
    insert(&engine, "c", "d").await;
    let computed = service.compute_stats().await.unwrap();
    assert_eq!(computed.total, 2);
    assert_eq!(computed.source_files, vec!["film".to_string()]);

    let latest = service.latest_stats().await.unwrap();
    assert_eq!(latest.total, 2);
    assert_eq!(latest.source_files, computed.source_files);
}

#[tokio::test]
async fn test_dedup_through_service() {
    let engine = setup_engine().await;
    let service = engine.service();
    for (p, s) in [("A", "B"), ("A", "B"), ("A", "B"), ("C", "D")] {
        insert(&engine, p, s).await;
    }

    let report = service.remove_duplicates().await.unwrap();
    assert_eq!(report.groups_with_duplicates, 1);
    assert_eq!(report.documents_deleted, 2);
    assert_eq!(service.pairs().count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_rating_update_refreshes_search_boost() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let first = insert(&engine, "see you later", "x").await;
    let second = insert(&engine, "see you later", "y").await;
    service.reindex().await.unwrap();

    let before = service.search("later").await.unwrap();
    assert_eq!(before.mode, SearchMode::Engine);
    assert_eq!(before.matches[0].pair.id, first.id);

    service
        .apply_update(&user, &second.id, UpdateRequest::rating(5))
        .await
        .unwrap();

    let after = service.search("later").await.unwrap();
    assert_eq!(after.matches[0].pair.id, second.id);
    assert_eq!(after.matches[0].pair.rating, 5);
}

#[tokio::test]
async fn test_search_before_reindex_uses_fallback() {
    let engine = setup_engine().await;
    let service = engine.service();
    insert(&engine, "hello big world", "x").await;
    insert(&engine, "say hello world", "y").await;

    let tokens = service.search("world hello").await.unwrap();
    assert_eq!(tokens.mode, SearchMode::Fallback);
    assert_eq!(tokens.matches.len(), 2);

    let phrase = service.search("\"hello world\"").await.unwrap();
    assert_eq!(phrase.matches.len(), 1);
    assert_eq!(phrase.matches[0].pair.primary_text, "say hello world");
}

#[tokio::test]
async fn test_update_before_reindex_keeps_search_on_fallback() {
    let engine = setup_engine().await;
    let service = engine.service();
    let user = AuthenticatedUser::new("alice");
    service.provision("alice").await.unwrap();
    let first = insert(&engine, "hello there", "x").await;
    insert(&engine, "hello again", "y").await;

    service
        .apply_update(&user, &first.id, UpdateRequest::rating(1))
        .await
        .unwrap();

    let outcome = service.search("hello").await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Fallback);
    assert_eq!(outcome.matches.len(), 2);
}

#[tokio::test]
async fn test_delete_all_clears_pairs_and_index() {
    let engine = setup_engine().await;
    let service = engine.service();
    insert(&engine, "hello", "x").await;
    service.reindex().await.unwrap();

    assert_eq!(service.delete_all().await.unwrap(), 1);
    let outcome = service.search("hello").await.unwrap();
    assert_eq!(outcome.mode, SearchMode::Engine);
    assert!(outcome.matches.is_empty());
    assert!(service.get_random().await.unwrap().is_none());
}

#[tokio::test]
async fn test_ingest_then_search() {
    let engine = setup_engine().await;
    let service = engine.service();
    let records = vec![
        NewPair {
            primary_text: "first line".to_string(),
            secondary_text: "первая строка".to_string(),
            seq_id: Some(1),
            ..Default::default()
        },
        NewPair {
            primary_text: "second line".to_string(),
            secondary_text: "вторая строка".to_string(),
            seq_id: Some(2),
            ..Default::default()
        },
    ];

    assert_eq!(service.ingest(records).await.unwrap(), 2);
    assert_eq!(service.reindex().await.unwrap(), 2);

    let outcome = service.search("строка").await.unwrap();
    assert_eq!(outcome.matches.len(), 2);
}
