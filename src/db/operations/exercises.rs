use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;

/// Generated exercise content. Validated as JSON when it enters the system and
/// otherwise passed through untouched.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExercisePayload(Box<RawValue>);

impl ExercisePayload {
    pub fn from_json(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self)
    }

    pub fn from_raw(raw: Box<RawValue>) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }
}

impl fmt::Debug for ExercisePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExercisePayload").field(&self.as_str()).finish()
    }
}

impl PartialEq for ExercisePayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub topic_id: String,
    pub prompt_hash: String,
    pub payload: ExercisePayload,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_exercise(
    proxy: &DatabaseProxy,
    topic_id: &str,
    prompt_hash: &str,
    payload: &ExercisePayload,
) -> Result<Exercise, sqlx::Error> {
    let exercise = Exercise {
        id: Uuid::new_v4().to_string(),
        topic_id: topic_id.to_string(),
        prompt_hash: prompt_hash.to_string(),
        payload: payload.clone(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO "exercises" ("id", "topic_id", "prompt_hash", "exercise_json", "created_at")
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&exercise.id)
    .bind(&exercise.topic_id)
    .bind(&exercise.prompt_hash)
    .bind(exercise.payload.as_str())
    .bind(exercise.created_at)
    .execute(proxy.pool())
    .await?;

    Ok(exercise)
}

pub async fn list_exercises_for_prompt(
    proxy: &DatabaseProxy,
    topic_id: &str,
    prompt_hash: &str,
) -> Result<Vec<Exercise>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "topic_id", "prompt_hash", "exercise_json", "created_at"
        FROM "exercises"
        WHERE "topic_id" = $1 AND "prompt_hash" = $2
        ORDER BY "created_at" ASC
        "#,
    )
    .bind(topic_id)
    .bind(prompt_hash)
    .fetch_all(proxy.pool())
    .await?;
    rows.iter().map(map_exercise).collect()
}

pub async fn count_exercises_for_topic(
    proxy: &DatabaseProxy,
    topic_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "exercises" WHERE "topic_id" = $1"#)
        .bind(topic_id)
        .fetch_one(proxy.pool())
        .await
}

fn map_exercise(row: &SqliteRow) -> Result<Exercise, sqlx::Error> {
    let json: String = row.try_get("exercise_json")?;
    let payload = ExercisePayload::from_json(json).map_err(|e| sqlx::Error::ColumnDecode {
        index: "exercise_json".to_string(),
        source: Box::new(e),
    })?;

    Ok(Exercise {
        id: row.try_get("id")?,
        topic_id: row.try_get("topic_id")?,
        prompt_hash: row.try_get("prompt_hash")?,
        payload,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_preserves_text_verbatim() {
        let json = r#"{"sentence": "Ich bleibe zu Hause, weil es regnet.",  "hint":"because"}"#;
        let payload = ExercisePayload::from_json(json).unwrap();
        assert_eq!(payload.as_str(), json);
        assert_eq!(serde_json::to_string(&payload).unwrap(), json);
    }

    #[test]
    fn test_payload_rejects_invalid_json() {
        assert!(ExercisePayload::from_json("{not json").is_err());
    }
}
