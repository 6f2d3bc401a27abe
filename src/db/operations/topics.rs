use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::db::DatabaseProxy;

/// Number of prompt versions retained per topic.
pub const MAX_PROMPT_VERSIONS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: String,
    pub topic_id: String,
    pub prompt: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

pub async fn get_topic(
    proxy: &DatabaseProxy,
    topic_id: &str,
) -> Result<Option<Topic>, sqlx::Error> {
    let mut conn = proxy.pool().acquire().await?;
    fetch_topic(&mut conn, topic_id).await
}

pub async fn list_topics(proxy: &DatabaseProxy) -> Result<Vec<Topic>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "name", "prompt", "created_at", "updated_at"
        FROM "topics"
        ORDER BY "created_at" ASC
        "#,
    )
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_topic).collect()
}

pub async fn count_topics(proxy: &DatabaseProxy) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "topics""#)
        .fetch_one(proxy.pool())
        .await
}

/// Inserts the topic together with its first prompt version.
pub async fn insert_topic(
    proxy: &DatabaseProxy,
    name: &str,
    prompt: &str,
) -> Result<Topic, sqlx::Error> {
    let now = Utc::now();
    let topic = Topic {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        prompt: prompt.to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut tx = proxy.pool().begin().await?;
    sqlx::query(
        r#"
        INSERT INTO "topics" ("id", "name", "prompt", "created_at", "updated_at")
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&topic.id)
    .bind(&topic.name)
    .bind(&topic.prompt)
    .bind(topic.created_at)
    .bind(topic.updated_at)
    .execute(&mut *tx)
    .await?;

    append_version(&mut *tx, &topic.id, prompt).await?;
    tx.commit().await?;

    Ok(topic)
}

/// Appends a prompt version, prunes the history to the newest
/// [`MAX_PROMPT_VERSIONS`] and rewrites the topic row as one transaction.
/// Returns `None` when the topic does not exist.
pub async fn update_topic(
    proxy: &DatabaseProxy,
    topic_id: &str,
    name: &str,
    prompt: &str,
) -> Result<Option<Topic>, sqlx::Error> {
    let _guard = proxy.lock_version_writes().await;
    let mut tx = proxy.pool().begin().await?;

    if fetch_topic(&mut *tx, topic_id).await?.is_none() {
        return Ok(None);
    }

    let version = append_version(&mut *tx, topic_id, prompt).await?;
    let pruned = prune_versions(&mut *tx, topic_id).await?;
    if pruned > 0 {
        tracing::debug!(topic_id, pruned, latest = version.version, "pruned prompt versions");
    }

    sqlx::query(
        r#"
        UPDATE "topics"
        SET "name" = $1, "prompt" = $2, "updated_at" = $3
        WHERE "id" = $4
        "#,
    )
    .bind(name)
    .bind(prompt)
    .bind(Utc::now())
    .bind(topic_id)
    .execute(&mut *tx)
    .await?;

    let updated = fetch_topic(&mut *tx, topic_id).await?;
    tx.commit().await?;
    Ok(updated)
}

pub async fn delete_topic(proxy: &DatabaseProxy, topic_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM "topics" WHERE "id" = $1"#)
        .bind(topic_id)
        .execute(proxy.pool())
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_versions(
    proxy: &DatabaseProxy,
    topic_id: &str,
) -> Result<Vec<PromptVersion>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "topic_id", "prompt", "version", "created_at"
        FROM "prompt_versions"
        WHERE "topic_id" = $1
        ORDER BY "version" ASC
        "#,
    )
    .bind(topic_id)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_version).collect()
}

pub async fn get_version(
    proxy: &DatabaseProxy,
    version_id: &str,
) -> Result<Option<PromptVersion>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "topic_id", "prompt", "version", "created_at"
        FROM "prompt_versions"
        WHERE "id" = $1
        "#,
    )
    .bind(version_id)
    .fetch_optional(proxy.pool())
    .await?;
    row.as_ref().map(map_version).transpose()
}

async fn fetch_topic(
    conn: &mut SqliteConnection,
    topic_id: &str,
) -> Result<Option<Topic>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "name", "prompt", "created_at", "updated_at"
        FROM "topics"
        WHERE "id" = $1
        "#,
    )
    .bind(topic_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(map_topic).transpose()
}

async fn append_version(
    conn: &mut SqliteConnection,
    topic_id: &str,
    prompt: &str,
) -> Result<PromptVersion, sqlx::Error> {
    let latest: Option<i64> = sqlx::query_scalar(
        r#"SELECT MAX("version") FROM "prompt_versions" WHERE "topic_id" = $1"#,
    )
    .bind(topic_id)
    .fetch_one(&mut *conn)
    .await?;

    let version = PromptVersion {
        id: Uuid::new_v4().to_string(),
        topic_id: topic_id.to_string(),
        prompt: prompt.to_string(),
        version: latest.unwrap_or(0) + 1,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO "prompt_versions" ("id", "topic_id", "prompt", "version", "created_at")
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&version.id)
    .bind(&version.topic_id)
    .bind(&version.prompt)
    .bind(version.version)
    .bind(version.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(version)
}

async fn prune_versions(conn: &mut SqliteConnection, topic_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM "prompt_versions"
        WHERE "topic_id" = $1
          AND "version" <= (
              SELECT MAX("version") FROM "prompt_versions" WHERE "topic_id" = $1
          ) - $2
        "#,
    )
    .bind(topic_id)
    .bind(MAX_PROMPT_VERSIONS)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

fn map_topic(row: &SqliteRow) -> Result<Topic, sqlx::Error> {
    Ok(Topic {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        prompt: row.try_get("prompt")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_version(row: &SqliteRow) -> Result<PromptVersion, sqlx::Error> {
    Ok(PromptVersion {
        id: row.try_get("id")?,
        topic_id: row.try_get("topic_id")?,
        prompt: row.try_get("prompt")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
    })
}
