//! Records kept in the ephemeral store
//!
//! Each key namespace has exactly one record type, serialized as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof that an email was verified, awaiting wallet link
///
/// Stored under `signup_session:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignupSessionRecord {
    pub pending_signup_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Proof of full authentication
///
/// Stored under `session:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainSessionRecord {
    pub user_id: Uuid,
    pub address: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// One-time wallet challenge
///
/// Stored under `nonce:<value>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub session_id: String,
    pub address: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
}

impl NonceRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the nonce was issued to this session and address
    pub fn is_bound_to(&self, session_id: &str, address: &str) -> bool {
        self.session_id == session_id && self.address.eq_ignore_ascii_case(address)
    }
}

/// One-time login link for an existing user
///
/// Stored under `login_magic_link:<tokenHash>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginLinkRecord {
    pub user_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
