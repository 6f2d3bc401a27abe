use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub google_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub total_exercises: i64,
    #[serde(default)]
    pub total_mistakes: i64,
    #[serde(default)]
    pub total_hints: i64,
    #[serde(default)]
    pub total_time: i64,
    #[serde(default)]
    pub last_topic_id: String,
}

pub async fn get_user(proxy: &DatabaseProxy, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT "id", "google_id" FROM "users" WHERE "id" = $1"#)
        .bind(user_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_user).transpose()
}

pub async fn get_user_by_google_id(
    proxy: &DatabaseProxy,
    google_id: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT "id", "google_id" FROM "users" WHERE "google_id" = $1"#)
        .bind(google_id)
        .fetch_optional(proxy.pool())
        .await?;
    row.as_ref().map(map_user).transpose()
}

pub async fn insert_user(proxy: &DatabaseProxy, google_id: &str) -> Result<User, sqlx::Error> {
    let user = User {
        id: Uuid::new_v4().to_string(),
        google_id: google_id.to_string(),
    };
    sqlx::query(r#"INSERT INTO "users" ("id", "google_id") VALUES ($1, $2)"#)
        .bind(&user.id)
        .bind(&user.google_id)
        .execute(proxy.pool())
        .await?;
    Ok(user)
}

pub async fn get_or_create_user(
    proxy: &DatabaseProxy,
    google_id: &str,
) -> Result<User, sqlx::Error> {
    if let Some(user) = get_user_by_google_id(proxy, google_id).await? {
        return Ok(user);
    }
    tracing::info!(google_id, "creating user on first login");
    insert_user(proxy, google_id).await
}

/// Stats of a user; a blank record when nothing was reported yet.
pub async fn get_user_stats(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<UserStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "user_id", "total_exercises", "total_mistakes", "total_hints",
               "total_time", COALESCE("last_topic_id", '') AS "last_topic_id"
        FROM "user_stats"
        WHERE "user_id" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;

    match row {
        Some(row) => map_stats(&row),
        None => Ok(UserStats {
            user_id: user_id.to_string(),
            ..UserStats::default()
        }),
    }
}

/// Upserts the counters; `last_topic_id` is only written on first insert.
pub async fn upsert_user_stats(
    proxy: &DatabaseProxy,
    stats: &UserStats,
) -> Result<(), sqlx::Error> {
    let id = if stats.id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        stats.id.clone()
    };

    sqlx::query(
        r#"
        INSERT INTO "user_stats"
            ("id", "user_id", "total_exercises", "total_mistakes", "total_hints", "total_time", "last_topic_id")
        VALUES ($1, $2, $3, $4, $5, $6, NULLIF($7, ''))
        ON CONFLICT ("user_id") DO UPDATE SET
            "total_exercises" = excluded."total_exercises",
            "total_mistakes" = excluded."total_mistakes",
            "total_hints" = excluded."total_hints",
            "total_time" = excluded."total_time"
        "#,
    )
    .bind(id)
    .bind(&stats.user_id)
    .bind(stats.total_exercises)
    .bind(stats.total_mistakes)
    .bind(stats.total_hints)
    .bind(stats.total_time)
    .bind(&stats.last_topic_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

pub async fn set_last_topic(
    proxy: &DatabaseProxy,
    user_id: &str,
    last_topic_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "user_stats"
            ("id", "user_id", "last_topic_id", "total_exercises", "total_mistakes", "total_hints", "total_time")
        VALUES ($1, $2, NULLIF($3, ''), 0, 0, 0, 0)
        ON CONFLICT ("user_id") DO UPDATE SET
            "last_topic_id" = excluded."last_topic_id"
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(last_topic_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

fn map_user(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        google_id: row.try_get("google_id")?,
    })
}

fn map_stats(row: &SqliteRow) -> Result<UserStats, sqlx::Error> {
    Ok(UserStats {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total_exercises: row.try_get("total_exercises")?,
        total_mistakes: row.try_get("total_mistakes")?,
        total_hints: row.try_get("total_hints")?,
        total_time: row.try_get("total_time")?,
        last_topic_id: row.try_get("last_topic_id")?,
    })
}
