//! Serves exercise batches from the per-prompt cache, filling it on demand.
//!
//! Cached exercises are keyed by the hash of the topic prompt they were
//! generated from, so editing a prompt retires the old cache without any
//! explicit eviction. Anonymous callers only ever see what is cached;
//! identified callers get exercises that are due for them and trigger
//! generation when too few are.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::operations::{Exercise, ExercisePayload, Topic, UserExerciseView};
use crate::services::exercise_generator::{ContentGenerator, GenerationError};
use crate::services::prompt_refiner::{refine_or_original, PromptRefiner};
use crate::services::{prompt_hash, srs};
use crate::store::{ContentStore, StoreError};

const DEFAULT_REFINE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("topic not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-request facts about how a batch was produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Exercises newly persisted while serving this request.
    pub generated: usize,
    /// Refined prompt sent to the generator, if refinement succeeded.
    pub refined_prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExerciseBatch {
    pub exercises: Vec<Exercise>,
    pub report: BatchReport,
}

/// Output of a generation run that is not written to the cache.
#[derive(Debug, Clone)]
pub struct GenerationPreview {
    pub exercises: Vec<ExercisePayload>,
    pub refined_prompt: Option<String>,
}

pub struct ExerciseEngine {
    store: Arc<dyn ContentStore>,
    generator: Arc<dyn ContentGenerator>,
    refiner: Arc<dyn PromptRefiner>,
    batch_size: usize,
    generation_timeout: Duration,
    refine_timeout: Duration,
}

impl ExerciseEngine {
    pub fn new(
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn ContentGenerator>,
        refiner: Arc<dyn PromptRefiner>,
        batch_size: usize,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            refiner,
            batch_size,
            generation_timeout,
            refine_timeout: DEFAULT_REFINE_TIMEOUT.min(generation_timeout),
        }
    }

    /// Caps how long refinement may run before the stored prompt is used instead.
    pub fn with_refine_timeout(mut self, refine_timeout: Duration) -> Self {
        self.refine_timeout = refine_timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn get_exercise_batch(
        &self,
        topic_id: &str,
        user_id: Option<&str>,
    ) -> Result<ExerciseBatch, EngineError> {
        let topic = self.load_topic(topic_id).await?;
        let hash = prompt_hash(&topic.prompt);
        let mut cached = self.store.exercises_for_prompt(&topic.id, &hash).await?;

        let Some(user_id) = user_id else {
            let exercises = select_batch(cached, self.batch_size, &mut rand::rng());
            info!(topic_id = %topic.id, count = exercises.len(), "served anonymous batch");
            return Ok(ExerciseBatch {
                exercises,
                report: BatchReport::default(),
            });
        };

        let views = self.store.user_views(user_id).await?;
        let mut eligible = srs::eligible_exercises(&cached, &views, Utc::now());
        let mut report = BatchReport::default();

        if eligible.len() < self.batch_size {
            info!(
                topic_id = %topic.id,
                user_id,
                eligible = eligible.len(),
                cached = cached.len(),
                "not enough due exercises, generating"
            );
            let (generated, refined_prompt) =
                self.fill_cache(&topic, &hash).await.inspect_err(|err| {
                    error!(topic_id = %topic.id, error = %err, "exercise generation failed")
                })?;
            report.generated = generated.len();
            report.refined_prompt = refined_prompt;
            cached.extend(generated);
            eligible = srs::eligible_exercises(&cached, &views, Utc::now());
        }

        let exercises = select_batch(eligible, self.batch_size, &mut rand::rng());
        self.record_views(user_id, &exercises, &views, Utc::now()).await;

        info!(
            topic_id = %topic.id,
            user_id,
            count = exercises.len(),
            generated = report.generated,
            "served batch"
        );
        Ok(ExerciseBatch { exercises, report })
    }

    /// Runs refinement and generation for a topic without touching the cache.
    pub async fn preview_generation(
        &self,
        topic_id: &str,
    ) -> Result<GenerationPreview, EngineError> {
        let topic = self.load_topic(topic_id).await?;
        let (exercises, refined_prompt) = self.generate_bounded(&topic.prompt).await?;
        Ok(GenerationPreview {
            exercises,
            refined_prompt,
        })
    }

    async fn load_topic(&self, topic_id: &str) -> Result<Topic, EngineError> {
        self.store
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(topic_id.to_string()))
    }

    /// Generates new exercises and persists the ones that can be stored.
    async fn fill_cache(
        &self,
        topic: &Topic,
        hash: &str,
    ) -> Result<(Vec<Exercise>, Option<String>), GenerationError> {
        let (payloads, refined_prompt) = self.generate_bounded(&topic.prompt).await?;

        let mut created = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            match self.store.create_exercise(&topic.id, hash, payload).await {
                Ok(exercise) => created.push(exercise),
                Err(err) => warn!(topic_id = %topic.id, error = %err, "failed to cache exercise"),
            }
        }
        Ok((created, refined_prompt))
    }

    /// Refinement and generation run under separate bounds. Refinement that
    /// runs out of time falls back to the stored prompt.
    async fn generate_bounded(
        &self,
        prompt: &str,
    ) -> Result<(Vec<ExercisePayload>, Option<String>), GenerationError> {
        let (final_prompt, refined) =
            refine_or_original(self.refiner.as_ref(), prompt, self.refine_timeout).await;
        let payloads = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&final_prompt),
        )
        .await
        .map_err(|_| GenerationError::Timeout(self.generation_timeout))??;
        Ok((payloads, refined.then_some(final_prompt)))
    }

    /// Advances the schedule of every served exercise. Failures are logged only.
    async fn record_views(
        &self,
        user_id: &str,
        served: &[Exercise],
        views: &HashMap<String, UserExerciseView>,
        now: DateTime<Utc>,
    ) {
        let updated: Vec<UserExerciseView> = served
            .iter()
            .map(|exercise| {
                srs::record_serving(views.get(&exercise.id), user_id, &exercise.id, now)
            })
            .collect();

        if let Err(err) = self.store.upsert_user_views(&updated).await {
            warn!(user_id, count = updated.len(), error = %err, "failed to update view history");
        }
    }
}

/// Picks up to `size` items uniformly at random without replacement.
pub fn select_batch<T, R: Rng + ?Sized>(mut pool: Vec<T>, size: usize, rng: &mut R) -> Vec<T> {
    if pool.len() > size {
        pool.shuffle(rng);
        pool.truncate(size);
    }
    pool
}
