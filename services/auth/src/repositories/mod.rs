//! Durable store capabilities
//!
//! [`CredentialStore`] exposes reads plus [`CredentialStore::begin`], which
//! opens a [`CredentialTx`]. Every multi-step mutation of the pipeline goes
//! through a transaction; dropping a transaction without committing rolls it
//! back. [`JobStore`] backs the delivery queue.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::{
    Job, JobStatus, MagicLink, NewJob, NewMagicLink, NewPendingSignup, NewUser, PendingSignup, User,
};

/// Constraint names reported on unique violations
pub const USERS_EMAIL_CONSTRAINT: &str = "users_email_key";
pub const USERS_ADDRESS_CONSTRAINT: &str = "users_address_key";

/// Relational store holding users, pending signups and magic links
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether [`CredentialStore::begin`] provides real atomicity
    fn supports_transactions(&self) -> bool {
        true
    }

    async fn get_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    /// Look up a user by address, case-insensitively
    async fn get_user_by_address(&self, address: &str) -> DatabaseResult<Option<User>>;

    async fn get_pending_signup(&self, id: Uuid) -> DatabaseResult<Option<PendingSignup>>;

    async fn get_magic_link_by_hash(&self, token_hash: &str) -> DatabaseResult<Option<MagicLink>>;

    /// Open a transaction
    async fn begin(&self) -> DatabaseResult<Box<dyn CredentialTx>>;
}

/// Writes executed atomically
#[async_trait]
pub trait CredentialTx: Send {
    /// Invalidate active signups for an email and burn their magic links.
    ///
    /// Returns the number of signups invalidated.
    async fn invalidate_pending_signups(&mut self, email: &str) -> DatabaseResult<u64>;

    async fn create_pending_signup(
        &mut self,
        new_signup: &NewPendingSignup,
    ) -> DatabaseResult<PendingSignup>;

    async fn create_magic_link(&mut self, new_link: &NewMagicLink) -> DatabaseResult<MagicLink>;

    /// Mark a magic link used. Returns `false` if it was already used.
    async fn mark_magic_link_used(&mut self, id: Uuid) -> DatabaseResult<bool>;

    /// Stamp the verification time on an active signup.
    ///
    /// Returns `None` if the signup is gone or no longer active.
    async fn mark_pending_signup_verified(
        &mut self,
        id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> DatabaseResult<Option<PendingSignup>>;

    /// Mark a verified signup consumed into a user.
    ///
    /// Returns `false` if the signup is gone or no longer verified.
    async fn complete_pending_signup(&mut self, id: Uuid) -> DatabaseResult<bool>;

    async fn create_user(&mut self, new_user: &NewUser) -> DatabaseResult<User>;

    async fn commit(self: Box<Self>) -> DatabaseResult<()>;

    async fn rollback(self: Box<Self>) -> DatabaseResult<()>;
}

/// Durable storage for queued jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, new_job: &NewJob) -> DatabaseResult<Job>;

    async fn get_job(&self, id: Uuid) -> DatabaseResult<Option<Job>>;

    /// Oldest pending job whose `scheduled_at` has passed
    async fn get_next_pending_job(&self) -> DatabaseResult<Option<Job>>;

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> DatabaseResult<Job>;

    /// Bump the retry counter, keep the job pending and reschedule it
    async fn increment_job_retry(
        &self,
        id: Uuid,
        error_message: &str,
        scheduled_at: DateTime<Utc>,
    ) -> DatabaseResult<Job>;
}
