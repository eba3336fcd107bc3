//! PostgreSQL implementation of the durable stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info};
use uuid::Uuid;

use super::{CredentialStore, CredentialTx, JobStore};
use crate::models::{
    Job, JobStatus, MagicLink, NewJob, NewMagicLink, NewPendingSignup, NewUser, PendingSignup,
    SignupStatus, User,
};

/// PostgreSQL-backed credential and job store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over a connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn get_user_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, full_name, email, address, display_name, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, full_name, email, address, display_name, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_user_by_address(&self, address: &str) -> DatabaseResult<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, full_name, email, address, display_name, created_at, updated_at
            FROM users
            WHERE address = LOWER($1)
            "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_pending_signup(&self, id: Uuid) -> DatabaseResult<Option<PendingSignup>> {
        sqlx::query_as::<_, PendingSignup>(
            r#"
            SELECT id, full_name, email, display_name, email_verified_at, status, expires_at, created_at
            FROM pending_signups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_magic_link_by_hash(&self, token_hash: &str) -> DatabaseResult<Option<MagicLink>> {
        sqlx::query_as::<_, MagicLink>(
            r#"
            SELECT id, pending_signup_id, token_hash, expires_at, used, created_at
            FROM magic_links
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn CredentialTx>> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            DatabaseError::Connection(e)
        })?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// Open PostgreSQL transaction; rolls back when dropped uncommitted
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CredentialTx for PgTx {
    async fn invalidate_pending_signups(&mut self, email: &str) -> DatabaseResult<u64> {
        sqlx::query(
            r#"
            UPDATE magic_links
            SET used = TRUE
            WHERE used = FALSE
              AND pending_signup_id IN (
                SELECT id FROM pending_signups
                WHERE email = $1 AND status IN ('pending', 'verified')
              )
            "#,
        )
        .bind(email)
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)?;

        let result = sqlx::query(
            r#"
            UPDATE pending_signups
            SET status = $2
            WHERE email = $1 AND status IN ('pending', 'verified')
            "#,
        )
        .bind(email)
        .bind(SignupStatus::Invalidated.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(result.rows_affected())
    }

    async fn create_pending_signup(
        &mut self,
        new_signup: &NewPendingSignup,
    ) -> DatabaseResult<PendingSignup> {
        sqlx::query_as::<_, PendingSignup>(
            r#"
            INSERT INTO pending_signups (full_name, email, display_name, status, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, full_name, email, display_name, email_verified_at, status, expires_at, created_at
            "#,
        )
        .bind(&new_signup.full_name)
        .bind(&new_signup.email)
        .bind(&new_signup.display_name)
        .bind(SignupStatus::Pending.as_str())
        .bind(new_signup.expires_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn create_magic_link(&mut self, new_link: &NewMagicLink) -> DatabaseResult<MagicLink> {
        sqlx::query_as::<_, MagicLink>(
            r#"
            INSERT INTO magic_links (pending_signup_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, pending_signup_id, token_hash, expires_at, used, created_at
            "#,
        )
        .bind(new_link.pending_signup_id)
        .bind(&new_link.token_hash)
        .bind(new_link.expires_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn mark_magic_link_used(&mut self, id: Uuid) -> DatabaseResult<bool> {
        let result = sqlx::query("UPDATE magic_links SET used = TRUE WHERE id = $1 AND used = FALSE")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from_query)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_pending_signup_verified(
        &mut self,
        id: Uuid,
        verified_at: DateTime<Utc>,
    ) -> DatabaseResult<Option<PendingSignup>> {
        sqlx::query_as::<_, PendingSignup>(
            r#"
            UPDATE pending_signups
            SET email_verified_at = $2, status = $3
            WHERE id = $1 AND status IN ('pending', 'verified')
            RETURNING id, full_name, email, display_name, email_verified_at, status, expires_at, created_at
            "#,
        )
        .bind(id)
        .bind(verified_at)
        .bind(SignupStatus::Verified.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn complete_pending_signup(&mut self, id: Uuid) -> DatabaseResult<bool> {
        let result =
            sqlx::query("UPDATE pending_signups SET status = $2 WHERE id = $1 AND status = $3")
                .bind(id)
                .bind(SignupStatus::Completed.as_str())
                .bind(SignupStatus::Verified.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(DatabaseError::from_query)?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_user(&mut self, new_user: &NewUser) -> DatabaseResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (full_name, email, address, display_name)
            VALUES ($1, $2, LOWER($3), $4)
            RETURNING id, full_name, email, address, display_name, created_at, updated_at
            "#,
        )
        .bind(&new_user.full_name)
        .bind(&new_user.email)
        .bind(&new_user.address)
        .bind(&new_user.display_name)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(DatabaseError::from_query)?;

        info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn commit(self: Box<Self>) -> DatabaseResult<()> {
        self.tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            DatabaseError::Query(e)
        })
    }

    async fn rollback(self: Box<Self>) -> DatabaseResult<()> {
        self.tx.rollback().await.map_err(DatabaseError::Query)
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, new_job: &NewJob) -> DatabaseResult<Job> {
        sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (type, payload, status, max_retries, scheduled_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, type, payload, status, retry_count, max_retries, scheduled_at,
                      error_message, created_at, updated_at
            "#,
        )
        .bind(&new_job.job_type)
        .bind(&new_job.payload)
        .bind(JobStatus::Pending.as_str())
        .bind(new_job.max_retries)
        .bind(new_job.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_job(&self, id: Uuid) -> DatabaseResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, type, payload, status, retry_count, max_retries, scheduled_at,
                   error_message, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn get_next_pending_job(&self) -> DatabaseResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
            SELECT id, type, payload, status, retry_count, max_retries, scheduled_at,
                   error_message, created_at, updated_at
            FROM jobs
            WHERE status = 'pending' AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn update_job_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> DatabaseResult<Job> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, type, payload, status, retry_count, max_retries, scheduled_at,
                      error_message, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }

    async fn increment_job_retry(
        &self,
        id: Uuid,
        error_message: &str,
        scheduled_at: DateTime<Utc>,
    ) -> DatabaseResult<Job> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET retry_count = retry_count + 1,
                error_message = $2,
                scheduled_at = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, type, payload, status, retry_count, max_retries, scheduled_at,
                      error_message, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(error_message)
        .bind(scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_query)
    }
}
