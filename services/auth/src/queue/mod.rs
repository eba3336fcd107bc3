//! Durable at-least-once job queue
//!
//! Jobs are rows in the job store. The [`worker::Worker`] polls for the
//! oldest eligible pending job, dispatches on its type tag and records the
//! outcome. Retried jobs stay `pending` with a bumped retry counter.

pub mod worker;

pub use worker::{Worker, WorkerConfig, WorkerHandle};

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::AuthResult;
use crate::models::{Job, JobStatus, NewJob};
use crate::repositories::JobStore;

/// Type tag of the magic link email job
pub const SEND_MAGIC_LINK_EMAIL: &str = "send_magic_link_email";

/// Retries allowed when the caller does not choose
pub const DEFAULT_MAX_RETRIES: i32 = 1;

/// Upper bound on a single retry delay
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(300);

/// Payload of a [`SEND_MAGIC_LINK_EMAIL`] job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicLinkEmailPayload {
    pub email: String,
    pub name: String,
    pub magic_link_url: String,
    #[serde(default)]
    pub is_login: bool,
}

/// Job queue over a [`JobStore`]
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    retry_backoff: Duration,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Delay retried jobs with exponential backoff starting at `base`.
    ///
    /// A zero base makes a retried job eligible on the next poll.
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_backoff = base;
        self
    }

    /// Enqueue a job, due now
    pub async fn enqueue<T: Serialize>(
        &self,
        job_type: &str,
        payload: &T,
        max_retries: Option<i32>,
    ) -> AuthResult<Job> {
        let new_job = NewJob {
            job_type: job_type.to_string(),
            payload: serde_json::to_value(payload)?,
            max_retries: max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            scheduled_at: Utc::now(),
        };
        let job = self.store.create_job(&new_job).await?;
        info!(job_id = %job.id, job_type = %job.job_type, "Enqueued job");
        Ok(job)
    }

    /// Oldest pending job that is due, if any
    pub async fn get_next_pending_job(&self) -> AuthResult<Option<Job>> {
        Ok(self.store.get_next_pending_job().await?)
    }

    pub async fn get_job(&self, id: uuid::Uuid) -> AuthResult<Option<Job>> {
        Ok(self.store.get_job(id).await?)
    }

    pub async fn mark_job_completed(&self, job: &Job) -> AuthResult<Job> {
        Ok(self
            .store
            .update_job_status(job.id, JobStatus::Completed, None)
            .await?)
    }

    pub async fn mark_job_failed(&self, job: &Job, reason: &str) -> AuthResult<Job> {
        warn!(job_id = %job.id, job_type = %job.job_type, "Job failed: {}", reason);
        Ok(self
            .store
            .update_job_status(job.id, JobStatus::Failed, Some(reason))
            .await?)
    }

    /// Keep the job pending, bump its retry counter and reschedule it
    pub async fn retry_job(&self, job: &Job, reason: &str) -> AuthResult<Job> {
        let attempt = u32::try_from(job.retry_count).unwrap_or(0).saturating_add(1);
        let delay = backoff_delay(attempt, self.retry_backoff);
        let scheduled_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        info!(
            job_id = %job.id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying job: {}",
            reason
        );
        Ok(self
            .store
            .increment_job_retry(job.id, reason, scheduled_at)
            .await?)
    }
}

fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let max = MAX_RETRY_BACKOFF.max(base);
    let shift = attempt.saturating_sub(1).min(31);
    let delay = base.checked_mul(1u32 << shift).unwrap_or(max).min(max);
    jitter_delay(delay)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryStore;

    fn payload() -> MagicLinkEmailPayload {
        MagicLinkEmailPayload {
            email: "jane@x.com".to_string(),
            name: "Jane".to_string(),
            magic_link_url: "http://localhost:5173/auth/verify?token=abc".to_string(),
            is_login: false,
        }
    }

    #[tokio::test]
    async fn enqueue_defaults_to_one_retry() {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()));
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 1);
        assert_eq!(job.payload["magic_link_url"], payload().magic_link_url);
    }

    #[tokio::test]
    async fn empty_queue_is_not_an_error() {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()));
        assert!(queue.get_next_pending_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retried_job_is_picked_again_without_backoff() {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()));
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), Some(3))
            .await
            .unwrap();

        let retried = queue.retry_job(&job, "smtp timeout").await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.error_message.as_deref(), Some("smtp timeout"));

        let next = queue.get_next_pending_job().await.unwrap().unwrap();
        assert_eq!(next.id, job.id);
    }

    #[tokio::test]
    async fn backoff_defers_retried_job() {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()))
            .with_retry_backoff(Duration::from_secs(60));
        let job = queue
            .enqueue(SEND_MAGIC_LINK_EMAIL, &payload(), None)
            .await
            .unwrap();

        let retried = queue.retry_job(&job, "smtp timeout").await.unwrap();
        assert!(retried.scheduled_at > Utc::now() + chrono::Duration::seconds(25));
        assert!(queue.get_next_pending_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminal_transitions_record_reason() {
        let queue = JobQueue::new(Arc::new(InMemoryStore::new()));
        let first = queue.enqueue("a", &payload(), None).await.unwrap();
        let second = queue.enqueue("b", &payload(), None).await.unwrap();

        let completed = queue.mark_job_completed(&first).await.unwrap();
        let failed = queue.mark_job_failed(&second, "boom").await.unwrap();

        assert_eq!(completed.status, JobStatus::Completed);
        assert_eq!(completed.error_message, None);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(queue.get_next_pending_job().await.unwrap().is_none());
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert_eq!(backoff_delay(1, Duration::ZERO), Duration::ZERO);

        let first = backoff_delay(1, Duration::from_secs(10));
        assert!(first >= Duration::from_secs(5) && first <= Duration::from_secs(10));

        let third = backoff_delay(3, Duration::from_secs(10));
        assert!(third >= Duration::from_secs(20) && third <= Duration::from_secs(40));

        let capped = backoff_delay(30, Duration::from_secs(10));
        assert!(capped <= MAX_RETRY_BACKOFF);
    }

    #[test]
    fn payload_login_flag_defaults_to_false() {
        let decoded: MagicLinkEmailPayload = serde_json::from_str(
            r#"{"email":"jane@x.com","name":"Jane","magic_link_url":"http://x"}"#,
        )
        .unwrap();
        assert!(!decoded.is_login);
    }
}
