use drill_backend::db::operations::{exercises, topics as topic_ops, users, views, UserStats};
use drill_backend::db::operations::topics::MAX_PROMPT_VERSIONS;
use drill_backend::services::topics::{self, TopicError};

mod common;

use common::{create_user, engine, seed_exercises, test_db, MockGenerator, MockRefiner};

#[tokio::test]
async fn create_topic_records_first_version() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Conjunctions", "prompt v1").await.unwrap();

    let versions = topics::list_versions(&db.proxy, &topic.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version, 1);
    assert_eq!(versions[0].prompt, "prompt v1");
}

#[tokio::test]
async fn create_topic_requires_name_and_prompt() {
    let db = test_db().await;
    assert!(matches!(
        topics::create_topic(&db.proxy, "  ", "prompt").await,
        Err(TopicError::Validation(_))
    ));
    assert!(matches!(
        topics::create_topic(&db.proxy, "Name", "").await,
        Err(TopicError::Validation(_))
    ));
}

#[tokio::test]
async fn history_keeps_newest_ten_versions() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Conjunctions", "prompt 1").await.unwrap();

    for n in 2..=13 {
        topics::update_topic(&db.proxy, &topic.id, None, &format!("prompt {n}"))
            .await
            .unwrap();
    }

    let versions = topics::list_versions(&db.proxy, &topic.id).await.unwrap();
    assert_eq!(versions.len() as i64, MAX_PROMPT_VERSIONS);
    let numbers: Vec<i64> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, (4..=13).collect::<Vec<_>>());
    assert_eq!(versions.last().unwrap().prompt, "prompt 13");

    let current = topics::get_topic(&db.proxy, &topic.id).await.unwrap();
    assert_eq!(current.prompt, "prompt 13");
    assert_eq!(current.name, "Conjunctions");
}

#[tokio::test]
async fn update_can_rename() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Old", "prompt").await.unwrap();

    let updated = topics::update_topic(&db.proxy, &topic.id, Some("New"), "prompt 2")
        .await
        .unwrap();
    assert_eq!(updated.name, "New");
    assert!(updated.updated_at >= topic.updated_at);
}

#[tokio::test]
async fn update_unknown_topic_is_not_found() {
    let db = test_db().await;
    assert!(matches!(
        topics::update_topic(&db.proxy, "missing", None, "prompt").await,
        Err(TopicError::NotFound(_))
    ));
    assert!(matches!(
        topics::update_topic(&db.proxy, "missing", None, " ").await,
        Err(TopicError::Validation(_))
    ));
}

#[tokio::test]
async fn concurrent_updates_keep_sequence_unique() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Conjunctions", "prompt 0").await.unwrap();

    let mut handles = Vec::new();
    for n in 1..=6 {
        let proxy = db.proxy.clone();
        let topic_id = topic.id.clone();
        handles.push(tokio::spawn(async move {
            topics::update_topic(&proxy, &topic_id, None, &format!("prompt {n}")).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let numbers: Vec<i64> = topics::list_versions(&db.proxy, &topic.id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(numbers, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn restore_appends_a_new_version() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Conjunctions", "first").await.unwrap();
    topics::update_topic(&db.proxy, &topic.id, None, "second").await.unwrap();

    let first = topics::list_versions(&db.proxy, &topic.id).await.unwrap()[0].clone();
    let restored = topics::restore_version(&db.proxy, &topic.id, &first.id).await.unwrap();
    assert_eq!(restored.prompt, "first");

    let versions = topics::list_versions(&db.proxy, &topic.id).await.unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[2].version, 3);
    assert_eq!(versions[2].prompt, "first");
}

#[tokio::test]
async fn restore_checks_version_ownership() {
    let db = test_db().await;
    let a = topics::create_topic(&db.proxy, "A", "prompt a").await.unwrap();
    let b = topics::create_topic(&db.proxy, "B", "prompt b").await.unwrap();
    let b_version = topics::list_versions(&db.proxy, &b.id).await.unwrap()[0].clone();

    assert!(matches!(
        topics::restore_version(&db.proxy, &a.id, &b_version.id).await,
        Err(TopicError::VersionTopicMismatch)
    ));
    assert!(matches!(
        topics::restore_version(&db.proxy, &a.id, "missing").await,
        Err(TopicError::VersionNotFound(_))
    ));
}

#[tokio::test]
async fn deleting_a_topic_removes_its_cache_and_history() {
    let db = test_db().await;
    let topic = topics::create_topic(&db.proxy, "Conjunctions", "prompt").await.unwrap();
    seed_exercises(&db.proxy, &topic, 12).await;
    let user = create_user(&db.proxy, "google-1").await;
    engine(&db.proxy, MockGenerator::returning(10), MockRefiner::prefixing())
        .get_exercise_batch(&topic.id, Some(&user.id))
        .await
        .unwrap();

    topics::delete_topic(&db.proxy, &topic.id).await.unwrap();

    assert_eq!(exercises::count_exercises_for_topic(&db.proxy, &topic.id).await.unwrap(), 0);
    assert!(topic_ops::list_versions(&db.proxy, &topic.id).await.unwrap().is_empty());
    assert!(views::get_user_views(&db.proxy, &user.id).await.unwrap().is_empty());
    assert!(matches!(
        topics::delete_topic(&db.proxy, &topic.id).await,
        Err(TopicError::NotFound(_))
    ));
}

#[tokio::test]
async fn default_topics_seed_only_an_empty_database() {
    let db = test_db().await;

    assert_eq!(topics::seed_default_topics(&db.proxy).await.unwrap(), 3);
    assert_eq!(topics::seed_default_topics(&db.proxy).await.unwrap(), 0);

    let names: Vec<String> = topics::list_topics(&db.proxy)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names.len(), 3);
    for expected in ["Conjunctions", "Verb + Preposition", "Preterite vs Perfect"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn user_stats_round_trip_and_settings() {
    let db = test_db().await;
    let user = create_user(&db.proxy, "google-1").await;

    let empty = users::get_user_stats(&db.proxy, &user.id).await.unwrap();
    assert_eq!(empty.user_id, user.id);
    assert_eq!(empty.total_exercises, 0);

    users::set_last_topic(&db.proxy, &user.id, "topic-1").await.unwrap();
    users::upsert_user_stats(
        &db.proxy,
        &UserStats {
            user_id: user.id.clone(),
            total_exercises: 12,
            total_mistakes: 3,
            total_hints: 1,
            total_time: 600,
            last_topic_id: "ignored-on-update".into(),
            ..UserStats::default()
        },
    )
    .await
    .unwrap();

    let stats = users::get_user_stats(&db.proxy, &user.id).await.unwrap();
    assert_eq!(stats.total_exercises, 12);
    assert_eq!(stats.total_mistakes, 3);
    assert_eq!(stats.total_time, 600);
    assert_eq!(stats.last_topic_id, "topic-1");
}

#[tokio::test]
async fn get_or_create_user_is_stable() {
    let db = test_db().await;
    let first = users::get_or_create_user(&db.proxy, "google-42").await.unwrap();
    let second = users::get_or_create_user(&db.proxy, "google-42").await.unwrap();
    assert_eq!(first, second);
}
