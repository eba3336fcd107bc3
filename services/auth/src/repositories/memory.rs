//! In-process implementation of the durable stores
//!
//! Transactions take the store lock for their whole lifetime and work on a
//! copy of the state, which replaces the shared state on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    CredentialStore, CredentialTx, JobStore, USERS_ADDRESS_CONSTRAINT, USERS_EMAIL_CONSTRAINT,
};
use crate::models::{
    Job, JobStatus, MagicLink, NewJob, NewMagicLink, NewPendingSignup, NewUser, PendingSignup,
    SignupStatus, User,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    pending_signups: HashMap<Uuid, PendingSignup>,
    magic_links: HashMap<Uuid, MagicLink>,
    jobs: HashMap<Uuid, Job>,
}

/// In-memory credential and job store
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All users, oldest first
    pub async fn users(&self) -> Vec<User> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by_key(|user| user.created_at);
        users
    }

    /// All jobs, oldest first
    pub async fn jobs(&self) -> Vec<Job> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Magic links issued for a pending signup
    pub async fn magic_links_for(&self, pending_signup_id: Uuid) -> Vec<MagicLink> {
        let state = self.state.lock().await;
        state
            .magic_links
            .values()
            .filter(|link| link.pending_signup_id == pending_signup_id)
            .cloned()
            .collect()
    }

    /// Overwrite a job row
    pub async fn put_job(&self, job: Job) {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.id, job);
    }

    /// Overwrite a pending signup row
    pub async fn put_pending_signup(&self, signup: PendingSignup) {
        let mut state = self.state.lock().await;
        state.pending_signups.insert(signup.id, signup);
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn get_user_by_address(&self, address: &str) -> DatabaseResult<Option<User>> {
        let address = address.to_lowercase();
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.address == address)
            .cloned())
    }

    async fn get_pending_signup(&self, id: Uuid) -> DatabaseResult<Option<PendingSignup>> {
        let state = self.state.lock().await;
        Ok(state.pending_signups.get(&id).cloned())
    }

    async fn get_magic_link_by_hash(&self, token_hash: &str) -> DatabaseResult<Option<MagicLink>> {
        let state = self.state.lock().await;
        Ok(state
            .magic_links
            .values()
            .find(|link| link.token_hash == token_hash)
            .cloned())
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn CredentialTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// Open in-memory transaction
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl CredentialTx for MemoryTx {
    async fn invalidate_pending_signups(&mut self, email: &str) -> DatabaseResult<u64> {
        let mut invalidated = Vec::new();
        for signup in self.working.pending_signups.values_mut() {
            if signup.email == email && signup.status.is_active() {
                signup.status = SignupStatus::Invalidated;
                invalidated.push(signup.id);
            }
        }
        for link in self.working.magic_links.values_mut() {
            if invalidated.contains(&link.pending_signup_id) {
                link.used = true;
            }
        }
        Ok(invalidated.len() as u64)
    }

    async fn create_pending_signup(
        &mut self,
        new_signup: &NewPendingSignup,
    ) -> DatabaseResult<PendingSignup> {
        let duplicate = self
            .working
            .pending_signups
            .values()
            .any(|signup| signup.email == new_signup.email && signup.status.is_active());
        if duplicate {
            return Err(DatabaseError::UniqueViolation {
                constraint: "pending_signups_active_email_key".to_string(),
            });
        }

        let signup = PendingSignup {
            id: Uuid::new_v4(),
            full_name: new_signup.full_name.clone(),
            email: new_signup.email.clone(),
            display_name: new_signup.display_name.clone(),
            email_verified_at: None,
            status: SignupStatus::Pending,
            expires_at: new_signup.expires_at,
            created_at: Utc::now(),
        };
        self.working
            .pending_signups
            .insert(signup.id, signup.clone());
        Ok(signup)
    }

    async fn create_magic_link(&mut self, new_link: &NewMagicLink) -> DatabaseResult<MagicLink> {
        if !self
            .working
            .pending_signups
            .contains_key(&new_link.pending_signup_id)
        {
            return Err(DatabaseError::Query(sqlx::Error::RowNotFound));
        }
        if self
            .working
            .magic_links
            .values()
            .any(|link| link.token_hash == new_link.token_hash)
        {
            return Err(DatabaseError::UniqueViolation {
                constraint: "magic_links_token_hash_key".to_string(),
            });
        }

        let link = MagicLink {
            id: Uuid::new_v4(),
            pending_signup_id: new_link.pending_signup_id,
            token_hash: new_link.token_hash.clone(),
            expires_at: new_link.expires_at,
            used: false,
            created_at: Utc::now(),
        };
        self.working.magic_links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn mark_magic_link_used(&mut self, id: Uuid) -> DatabaseResult<bool> {
        match self.working.magic_links.get_mut(&id) {
            Some(link) if !link.used => {
                link.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_pending_signup_verified(
        &mut self,
        id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> DatabaseResult<Option<PendingSignup>> {
        match self.working.pending_signups.get_mut(&id) {
            Some(signup) if signup.status.is_active() => {
                signup.email_verified_at = Some(verified_at);
                signup.status = SignupStatus::Verified;
                Ok(Some(signup.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_pending_signup(&mut self, id: Uuid) -> DatabaseResult<bool> {
        match self.working.pending_signups.get_mut(&id) {
            Some(signup) if signup.status == SignupStatus::Verified => {
                signup.status = SignupStatus::Completed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_user(&mut self, new_user: &NewUser) -> DatabaseResult<User> {
        let address = new_user.address.to_lowercase();
        if self
            .working
            .users
            .values()
            .any(|user| user.email == new_user.email)
        {
            return Err(DatabaseError::UniqueViolation {
                constraint: USERS_EMAIL_CONSTRAINT.to_string(),
            });
        }
        if self.working.users.values().any(|user| user.address == address) {
            return Err(DatabaseError::UniqueViolation {
                constraint: USERS_ADDRESS_CONSTRAINT.to_string(),
            });
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            full_name: new_user.full_name.clone(),
            email: new_user.email.clone(),
            address,
            display_name: new_user.display_name.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create_job(&self, new_job: &NewJob) -> DatabaseResult<Job> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            job_type: new_job.job_type.clone(),
            payload: new_job.payload.clone(),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: new_job.max_retries,
            scheduled_at: new_job.scheduled_at,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn get_next_pending_job(&self) -> DatabaseResult<Option<Job>> {
        let now = Utc::now();
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.scheduled_at <= now)
            .min_by_key(|job| (job.scheduled_at, job.created_at))
            .cloned())
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> DatabaseResult<Job> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(DatabaseError::Query(sqlx::Error::RowNotFound))?;
        job.status = status;
        job.error_message = error_message.map(str::to_string);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn increment_job_retry(
        &self,
        id: Uuid,
        error_message: &str,
        scheduled_at: DateTime<Utc>,
    ) -> DatabaseResult<Job> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or(DatabaseError::Query(sqlx::Error::RowNotFound))?;
        job.retry_count += 1;
        job.error_message = Some(error_message.to_string());
        job.scheduled_at = scheduled_at;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}
