use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::auth::{AdminPolicy, GoogleOAuth};
use crate::config::Config;
use crate::db::DatabaseProxy;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::exercise_engine::ExerciseEngine;
use crate::services::exercise_generator::LlmExerciseGenerator;
use crate::services::llm_provider::LLMProvider;
use crate::services::prompt_refiner::LlmPromptRefiner;

/// Most recent refined prompt, kept for the observability endpoint.
#[derive(Debug, Default)]
pub struct RefinementLog {
    last: RwLock<Option<String>>,
}

impl RefinementLog {
    pub fn record(&self, prompt: impl Into<String>) {
        *self.last.write() = Some(prompt.into());
    }

    pub fn last(&self) -> Option<String> {
        self.last.read().clone()
    }
}

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    config: Arc<Config>,
    db_proxy: Arc<DatabaseProxy>,
    engine: Arc<ExerciseEngine>,
    rate_limiter: Arc<RateLimiter>,
    refinements: Arc<RefinementLog>,
    admin: Arc<AdminPolicy>,
    oauth: Arc<GoogleOAuth>,
}

impl AppState {
    pub fn new(config: Config, db_proxy: DatabaseProxy, engine: ExerciseEngine) -> Self {
        Self {
            started_at: Instant::now(),
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            admin: Arc::new(AdminPolicy::new(config.admin_google_id.clone())),
            oauth: Arc::new(GoogleOAuth::new(config.google.clone())),
            refinements: Arc::new(RefinementLog::default()),
            engine: Arc::new(engine),
            db_proxy: Arc::new(db_proxy),
            config: Arc::new(config),
        }
    }

    /// Wires the engine to the configured LLM service.
    pub fn with_llm(config: Config, db_proxy: DatabaseProxy, llm: LLMProvider) -> Self {
        if !llm.is_available() {
            tracing::warn!("LLM not configured, cache misses for signed-in users will fail");
        }
        let llm = Arc::new(llm);
        let engine = ExerciseEngine::new(
            Arc::new(db_proxy.clone()),
            Arc::new(LlmExerciseGenerator::new(Arc::clone(&llm))),
            Arc::new(LlmPromptRefiner::new(llm)),
            config.batch_size,
            config.generation_timeout,
        )
        .with_refine_timeout(config.refine_timeout);
        Self::new(config, db_proxy, engine)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db_proxy(&self) -> &DatabaseProxy {
        &self.db_proxy
    }

    pub fn engine(&self) -> &ExerciseEngine {
        &self.engine
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn refinements(&self) -> &RefinementLog {
        &self.refinements
    }

    pub fn admin(&self) -> &AdminPolicy {
        &self.admin
    }

    pub fn oauth(&self) -> &GoogleOAuth {
        &self.oauth
    }
}
