//! Pending signup and magic link models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a pending signup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStatus {
    /// Awaiting email verification
    Pending,
    /// Email verified, awaiting wallet link
    Verified,
    /// Superseded by a newer signup for the same email
    Invalidated,
    /// Consumed into a user
    Completed,
}

impl SignupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignupStatus::Pending => "pending",
            SignupStatus::Verified => "verified",
            SignupStatus::Invalidated => "invalidated",
            SignupStatus::Completed => "completed",
        }
    }

    /// Whether the signup can still progress
    pub fn is_active(&self) -> bool {
        matches!(self, SignupStatus::Pending | SignupStatus::Verified)
    }
}

impl TryFrom<String> for SignupStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(SignupStatus::Pending),
            "verified" => Ok(SignupStatus::Verified),
            "invalidated" => Ok(SignupStatus::Invalidated),
            "completed" => Ok(SignupStatus::Completed),
            other => Err(format!("unknown signup status: {}", other)),
        }
    }
}

/// An unverified signup attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PendingSignup {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: SignupStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingSignup {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// New pending signup creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPendingSignup {
    pub full_name: String,
    pub email: String,
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A single-use email verification link; only the token hash is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MagicLink {
    pub id: Uuid,
    pub pending_signup_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl MagicLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// New magic link creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMagicLink {
    pub pending_signup_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}
