use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::middleware::rate_limit::RateLimiter;

/// Background maintenance jobs.
pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    rate_limiter: Arc<RateLimiter>,
    sweep_schedule: String,
    started: AtomicBool,
}

impl WorkerManager {
    pub async fn new(
        rate_limiter: Arc<RateLimiter>,
        sweep_schedule: impl Into<String>,
    ) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            rate_limiter,
            sweep_schedule: sweep_schedule.into(),
            started: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        let scheduler = self.scheduler.lock().await;

        {
            let limiter = Arc::clone(&self.rate_limiter);
            let shutdown_rx = self.shutdown_tx.subscribe();
            let job = Job::new_async(self.sweep_schedule.as_str(), move |_uuid, _lock| {
                let limiter = Arc::clone(&limiter);
                let mut rx = shutdown_rx.resubscribe();
                Box::pin(async move {
                    tokio::select! {
                        _ = rx.recv() => {},
                        removed = limiter.sweep_idle() => {
                            if removed > 0 {
                                info!(removed, "idle rate limit clients swept");
                            }
                        }
                    }
                })
            })
            .map_err(WorkerError::Scheduler)?;
            scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
            info!(schedule = %self.sweep_schedule, "rate limit sweep scheduled");
        }

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        self.started.store(true, Ordering::Relaxed);
        info!("workers started");
        Ok(())
    }

    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("stopping workers");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "error shutting down scheduler");
        }
        info!("workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitSettings;

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let limiter = Arc::new(RateLimiter::new(&RateLimitSettings::default()));
        let manager = WorkerManager::new(limiter, "not a cron").await.unwrap();
        assert!(matches!(manager.start().await, Err(WorkerError::Scheduler(_))));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let limiter = Arc::new(RateLimiter::new(&RateLimitSettings::default()));
        let manager = WorkerManager::new(limiter, "0 */10 * * * *").await.unwrap();
        manager.start().await.unwrap();
        manager.stop().await;
        manager.stop().await;
    }
}
