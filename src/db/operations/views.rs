use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserExerciseView {
    pub id: String,
    pub user_id: String,
    pub exercise_id: String,
    pub last_viewed: DateTime<Utc>,
    pub repetition_counter: i64,
}

/// All view records of a user, keyed by exercise id.
pub async fn get_user_views(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<HashMap<String, UserExerciseView>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "user_id", "exercise_id", "last_viewed", "repetition_counter"
        FROM "user_exercise_views"
        WHERE "user_id" = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(map_view)
        .map(|view| view.map(|v| (v.exercise_id.clone(), v)))
        .collect()
}

/// Writes the given views in one transaction. Rows conflict on
/// `(user_id, exercise_id)`, so an existing record is updated in place.
pub async fn upsert_user_views(
    proxy: &DatabaseProxy,
    views: &[UserExerciseView],
) -> Result<(), sqlx::Error> {
    if views.is_empty() {
        return Ok(());
    }

    let mut tx = proxy.pool().begin().await?;
    for view in views {
        sqlx::query(
            r#"
            INSERT INTO "user_exercise_views"
                ("id", "user_id", "exercise_id", "last_viewed", "repetition_counter")
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT ("user_id", "exercise_id") DO UPDATE SET
                "last_viewed" = excluded."last_viewed",
                "repetition_counter" = excluded."repetition_counter"
            "#,
        )
        .bind(&view.id)
        .bind(&view.user_id)
        .bind(&view.exercise_id)
        .bind(view.last_viewed)
        .bind(view.repetition_counter)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

fn map_view(row: &SqliteRow) -> Result<UserExerciseView, sqlx::Error> {
    Ok(UserExerciseView {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        exercise_id: row.try_get("exercise_id")?,
        last_viewed: row.try_get("last_viewed")?,
        repetition_counter: row.try_get("repetition_counter")?,
    })
}
