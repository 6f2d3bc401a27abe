pub mod migrate;
pub mod operations;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::db::migrate::MigrationError;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Handle to the SQLite store. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct DatabaseProxy {
    pool: SqlitePool,
    path: PathBuf,
    version_writes: Arc<Mutex<()>>,
}

impl DatabaseProxy {
    pub async fn from_config(config: &Config) -> Result<Self, DbInitError> {
        Self::open(&config.database_path, config.database_max_connections).await
    }

    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, DbInitError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        migrate::run_migrations(&pool).await?;
        tracing::info!(path = %path.display(), "database initialized");

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            version_writes: Arc::new(Mutex::new(())),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes prompt-version append/prune sequences within this process.
    /// SQLite's writer lock covers other processes.
    pub async fn lock_version_writes(&self) -> MutexGuard<'_, ()> {
        self.version_writes.lock().await
    }

    pub async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let result = tokio::time::timeout(
            HEALTH_CHECK_TIMEOUT,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await;

        match result {
            Ok(Ok(_)) => HealthCheckResult::Healthy {
                latency: started.elapsed(),
            },
            Ok(Err(err)) => HealthCheckResult::Unhealthy {
                reason: err.to_string(),
            },
            Err(_) => HealthCheckResult::Unhealthy {
                reason: "timeout".to_string(),
            },
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone)]
pub enum HealthCheckResult {
    Healthy { latency: Duration },
    Unhealthy { reason: String },
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthCheckResult::Healthy { .. })
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
