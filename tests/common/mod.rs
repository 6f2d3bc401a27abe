#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tempfile::TempDir;

use drill_backend::config::Config;
use drill_backend::db::operations::{
    exercises, topics, users, Exercise, ExercisePayload, Topic, User,
};
use drill_backend::db::DatabaseProxy;
use drill_backend::services::exercise_engine::ExerciseEngine;
use drill_backend::services::exercise_generator::{ContentGenerator, GenerationError};
use drill_backend::services::llm_provider::LLMError;
use drill_backend::services::prompt_hash;
use drill_backend::services::prompt_refiner::{PromptRefiner, RefineError};
use drill_backend::state::AppState;

pub const BATCH_SIZE: usize = 10;

/// Generator double returning `per_call` fresh payloads and recording prompts.
pub struct MockGenerator {
    calls: AtomicUsize,
    per_call: usize,
    fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn returning(per_call: usize) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            per_call,
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        let generator = Self::returning(0);
        generator.fail.store(true, Ordering::SeqCst);
        generator
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ContentGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<Vec<ExercisePayload>, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Llm(LLMError::Api("upstream unavailable".into())));
        }
        Ok((0..self.per_call)
            .map(|i| {
                ExercisePayload::from_json(format!(
                    r#"{{"sentence":"Satz {call}-{i}","answer":"weil"}}"#
                ))
                .expect("valid payload")
            })
            .collect())
    }
}

/// Refiner double: prefixes the prompt, or fails when built with `failing`.
pub struct MockRefiner {
    calls: AtomicUsize,
    fail: bool,
}

impl MockRefiner {
    pub fn prefixing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PromptRefiner for MockRefiner {
    async fn refine(&self, prompt: &str) -> Result<String, RefineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LLMError::EmptyChoices.into());
        }
        Ok(format!("REFINED: {prompt}"))
    }
}

pub struct TestDb {
    _dir: TempDir,
    pub path: std::path::PathBuf,
    pub proxy: DatabaseProxy,
}

pub async fn test_db() -> TestDb {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("exercises.db");
    let proxy = DatabaseProxy::open(&path, 5).await.expect("open test database");
    TestDb {
        _dir: dir,
        path,
        proxy,
    }
}

pub fn engine(
    proxy: &DatabaseProxy,
    generator: Arc<MockGenerator>,
    refiner: Arc<MockRefiner>,
) -> ExerciseEngine {
    ExerciseEngine::new(
        Arc::new(proxy.clone()),
        generator,
        refiner,
        BATCH_SIZE,
        Duration::from_secs(5),
    )
}

pub async fn create_topic(proxy: &DatabaseProxy, name: &str, prompt: &str) -> Topic {
    topics::insert_topic(proxy, name, prompt).await.expect("insert topic")
}

pub async fn create_user(proxy: &DatabaseProxy, google_id: &str) -> User {
    users::insert_user(proxy, google_id).await.expect("insert user")
}

/// Caches `count` exercises for the topic's current prompt.
pub async fn seed_exercises(proxy: &DatabaseProxy, topic: &Topic, count: usize) -> Vec<Exercise> {
    let hash = prompt_hash(&topic.prompt);
    let mut created = Vec::with_capacity(count);
    for i in 0..count {
        let payload = ExercisePayload::from_json(format!(r#"{{"cached":{i}}}"#)).expect("payload");
        created.push(
            exercises::insert_exercise(proxy, &topic.id, &hash, &payload)
                .await
                .expect("insert exercise"),
        );
    }
    created
}

pub fn test_config(db: &TestDb) -> Config {
    Config::for_database(db.path.clone())
}

pub fn create_test_app(
    config: Config,
    db: &TestDb,
    generator: Arc<MockGenerator>,
    refiner: Arc<MockRefiner>,
) -> Router {
    let engine = engine(&db.proxy, generator, refiner);
    let state = AppState::new(config, db.proxy.clone(), engine);
    drill_backend::create_app(state)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
