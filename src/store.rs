//! Record interface the exercise engine reads from and writes to.
//!
//! The engine only sees this trait; the SQLite-backed [`DatabaseProxy`] is the
//! production implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::operations::{self, Exercise, ExercisePayload, Topic, UserExerciseView};
use crate::db::DatabaseProxy;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError>;

    /// Every exercise of the topic generated under the given prompt hash.
    async fn exercises_for_prompt(
        &self,
        topic_id: &str,
        prompt_hash: &str,
    ) -> Result<Vec<Exercise>, StoreError>;

    async fn create_exercise(
        &self,
        topic_id: &str,
        prompt_hash: &str,
        payload: &ExercisePayload,
    ) -> Result<Exercise, StoreError>;

    /// View history of a user keyed by exercise id.
    async fn user_views(&self, user_id: &str)
        -> Result<HashMap<String, UserExerciseView>, StoreError>;

    async fn upsert_user_views(&self, views: &[UserExerciseView]) -> Result<(), StoreError>;
}

#[async_trait]
impl ContentStore for DatabaseProxy {
    async fn get_topic(&self, topic_id: &str) -> Result<Option<Topic>, StoreError> {
        Ok(operations::topics::get_topic(self, topic_id).await?)
    }

    async fn exercises_for_prompt(
        &self,
        topic_id: &str,
        prompt_hash: &str,
    ) -> Result<Vec<Exercise>, StoreError> {
        Ok(operations::exercises::list_exercises_for_prompt(self, topic_id, prompt_hash).await?)
    }

    async fn create_exercise(
        &self,
        topic_id: &str,
        prompt_hash: &str,
        payload: &ExercisePayload,
    ) -> Result<Exercise, StoreError> {
        Ok(operations::exercises::insert_exercise(self, topic_id, prompt_hash, payload).await?)
    }

    async fn user_views(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, UserExerciseView>, StoreError> {
        Ok(operations::views::get_user_views(self, user_id).await?)
    }

    async fn upsert_user_views(&self, views: &[UserExerciseView]) -> Result<(), StoreError> {
        Ok(operations::views::upsert_user_views(self, views).await?)
    }
}
