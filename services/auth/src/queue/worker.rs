//! Background worker draining the job queue on a fixed tick

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::{JobQueue, MagicLinkEmailPayload, SEND_MAGIC_LINK_EMAIL};
use crate::config::seconds_from_env;
use crate::email::{EmailSender, MagicLinkEmail};
use crate::error::AuthResult;
use crate::models::Job;

/// Worker poll cadence and throughput
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    retry_backoff: Duration,
}

impl WorkerConfig {
    /// 5s poll interval, one job per tick, retries due on the next poll
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 1,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Create a new WorkerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `WORKER_POLL_INTERVAL_SECONDS`: Poll interval (default: 5)
    /// - `WORKER_BATCH_SIZE`: Jobs processed per tick (default: 1)
    /// - `QUEUE_RETRY_BACKOFF_SECONDS`: Base retry delay, 0 disables backoff (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::new();
        let batch_size = std::env::var("WORKER_BATCH_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.batch_size);

        Self {
            poll_interval: seconds_from_env("WORKER_POLL_INTERVAL_SECONDS", defaults.poll_interval),
            batch_size,
            retry_backoff: seconds_from_env("QUEUE_RETRY_BACKOFF_SECONDS", defaults.retry_backoff),
        }
        .normalize()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.normalize()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self.normalize()
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    fn normalize(self) -> Self {
        Self {
            poll_interval: if self.poll_interval.is_zero() {
                Duration::from_secs(1)
            } else {
                self.poll_interval
            },
            batch_size: self.batch_size.max(1),
            retry_backoff: self.retry_backoff,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Job worker
#[derive(Clone)]
pub struct Worker {
    queue: JobQueue,
    sender: Arc<dyn EmailSender>,
    config: WorkerConfig,
}

impl Worker {
    /// The queue's retry backoff is taken from `config`.
    pub fn new(queue: JobQueue, sender: Arc<dyn EmailSender>, config: WorkerConfig) -> Self {
        Self {
            queue: queue.with_retry_backoff(config.retry_backoff),
            sender,
            config,
        }
    }

    /// Run one tick: process up to `batch_size` distinct due jobs.
    ///
    /// A job retried during this tick waits for the next one.
    /// Returns the number of jobs handled.
    pub async fn process_jobs(&self) -> AuthResult<usize> {
        let mut seen = HashSet::new();
        while seen.len() < self.config.batch_size {
            let Some(job) = self.queue.get_next_pending_job().await? else {
                break;
            };
            if !seen.insert(job.id) {
                break;
            }
            self.process_job(&job).await?;
        }
        Ok(seen.len())
    }

    /// Dispatch a single job by type and record the outcome
    pub async fn process_job(&self, job: &Job) -> AuthResult<()> {
        match job.job_type.as_str() {
            SEND_MAGIC_LINK_EMAIL => self.send_magic_link_email(job).await,
            other => {
                self.queue
                    .mark_job_failed(job, &format!("unknown job type: {}", other))
                    .await?;
                Ok(())
            }
        }
    }

    async fn send_magic_link_email(&self, job: &Job) -> AuthResult<()> {
        let payload: MagicLinkEmailPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(job_id = %job.id, "Malformed job payload: {}", e);
                self.queue.mark_job_failed(job, "invalid payload").await?;
                return Ok(());
            }
        };

        let email = MagicLinkEmail {
            to_email: payload.email,
            to_name: payload.name,
            magic_link_url: payload.magic_link_url,
            is_login: payload.is_login,
        };

        match self.sender.send_magic_link(&email).await {
            Ok(()) => {
                self.queue.mark_job_completed(job).await?;
                info!(job_id = %job.id, "Magic link email delivered");
            }
            Err(e) => {
                let reason = e.to_string();
                if job.retry_count < job.max_retries {
                    self.queue.retry_job(job, &reason).await?;
                } else {
                    self.queue.mark_job_failed(job, &reason).await?;
                }
            }
        }
        Ok(())
    }

    /// Start polling in the background
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let poll_interval = self.config.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(poll_interval_ms = poll_interval.as_millis() as u64, "Job worker started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.process_jobs().await {
                            error!("Job worker tick failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("Job worker stopped");
        });

        WorkerHandle { shutdown_tx, task }
    }
}

/// Handle to a running worker
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop polling and wait for the in-flight tick to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Job worker task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use crate::repositories::InMemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSender {
        attempts: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmailSender for CountingSender {
        async fn send_magic_link(&self, _email: &MagicLinkEmail) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("provider unavailable"))
            } else {
                Ok(())
            }
        }
    }

    fn payload() -> MagicLinkEmailPayload {
        MagicLinkEmailPayload {
            email: "jane@x.com".to_string(),
            name: "Jane".to_string(),
            magic_link_url: "http://localhost:5173/auth/verify?token=abc".to_string(),
            is_login: true,
        }
    }

    fn worker(sender: Arc<CountingSender>, config: WorkerConfig) -> (Worker, JobQueue) {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()));
        (Worker::new(queue.clone(), sender, config), queue)
    }

    #[tokio::test]
    async fn delivers_and_completes() {
        let sender = Arc::new(CountingSender::default());
        let (worker, queue) = worker(sender.clone(), WorkerConfig::new());
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        assert_eq!(worker.process_jobs().await.unwrap(), 1);
        assert_eq!(worker.process_jobs().await.unwrap(), 0);

        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_payload_fails_without_retry() {
        let sender = Arc::new(CountingSender::default());
        let (worker, queue) = worker(sender.clone(), WorkerConfig::new());
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &serde_json::json!({"email": 42}), Some(5))
            .await
            .unwrap();

        worker.process_jobs().await.unwrap();

        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.error_message.as_deref(), Some("invalid payload"));
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_type_fails() {
        let sender = Arc::new(CountingSender::default());
        let (worker, queue) = worker(sender, WorkerConfig::new());
        let job = queue.enqueue("resize_avatar", &payload(), None).await.unwrap();

        worker.process_jobs().await.unwrap();

        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("unknown job type: resize_avatar")
        );
    }

    #[tokio::test]
    async fn delivery_failure_retries_then_fails() {
        let sender = Arc::new(CountingSender {
            fail: true,
            ..Default::default()
        });
        let (worker, queue) = worker(sender.clone(), WorkerConfig::new());
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        worker.process_jobs().await.unwrap();
        let retried = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.retry_count, 1);

        worker.process_jobs().await.unwrap();
        let failed = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.retry_count, failed.max_retries);
        assert_eq!(failed.error_message.as_deref(), Some("provider unavailable"));
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn tick_is_bounded_by_batch_size() {
        let sender = Arc::new(CountingSender::default());
        let (worker, queue) = worker(sender.clone(), WorkerConfig::new().with_batch_size(2));
        for _ in 0..3 {
            queue
                .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
                .await
                .unwrap();
        }

        assert_eq!(worker.process_jobs().await.unwrap(), 2);
        assert_eq!(worker.process_jobs().await.unwrap(), 1);
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failing_job_is_attempted_once_per_tick() {
        let sender = Arc::new(CountingSender {
            fail: true,
            ..Default::default()
        });
        let (worker, queue) = worker(sender.clone(), WorkerConfig::new().with_batch_size(5));
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), Some(3))
            .await
            .unwrap();

        assert_eq!(worker.process_jobs().await.unwrap(), 1);
        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn worker_applies_configured_backoff() {
        let sender = Arc::new(CountingSender {
            fail: true,
            ..Default::default()
        });
        let (worker, queue) = worker(
            sender.clone(),
            WorkerConfig::new().with_retry_backoff(Duration::from_secs(60)),
        );
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        assert_eq!(worker.process_jobs().await.unwrap(), 1);
        assert_eq!(worker.process_jobs().await.unwrap(), 0);

        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(sender.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawned_worker_drains_and_stops() {
        let sender = Arc::new(CountingSender::default());
        let (worker, queue) = worker(
            sender.clone(),
            WorkerConfig::new().with_poll_interval(Duration::from_millis(10)),
        );
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        let handle = worker.spawn();
        for _ in 0..100 {
            if sender.attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        let job = queue.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn config_normalizes_zero_values() {
        let config = WorkerConfig::new()
            .with_batch_size(0)
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn config_from_env() {
        unsafe {
            std::env::set_var("WORKER_POLL_INTERVAL_SECONDS", "2");
            std::env::set_var("WORKER_BATCH_SIZE", "4");
            std::env::set_var("QUEUE_RETRY_BACKOFF_SECONDS", "30");
        }

        let config = WorkerConfig::from_env();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.batch_size(), 4);
        assert_eq!(config.retry_backoff(), Duration::from_secs(30));

        unsafe {
            std::env::remove_var("WORKER_POLL_INTERVAL_SECONDS");
            std::env::remove_var("WORKER_BATCH_SIZE");
            std::env::remove_var("QUEUE_RETRY_BACKOFF_SECONDS");
        }
        assert_eq!(WorkerConfig::from_env(), WorkerConfig::new());
    }
}
