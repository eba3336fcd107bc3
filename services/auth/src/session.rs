//! Session, nonce and login-link records in the ephemeral store
//!
//! Key layout:
//! `signup_session:<id>`, `session:<id>`, `nonce:<value>`,
//! `session_nonce:<sessionId>:<address>`, `login_magic_link:<tokenHash>`.
//!
//! A manager built with [`SessionManager::disabled`] has no backing store:
//! every lookup misses and every write is dropped.

use common::cache::EphemeralStore;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::AuthResult;
use crate::models::{LoginLinkRecord, MainSessionRecord, NonceRecord, SignupSessionRecord};

fn signup_session_key(session_id: &str) -> String {
    format!("signup_session:{}", session_id)
}

fn main_session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn nonce_key(nonce: &str) -> String {
    format!("nonce:{}", nonce)
}

fn session_nonce_key(session_id: &str, address: &str) -> String {
    format!("session_nonce:{}:{}", session_id, address.to_lowercase())
}

fn login_link_key(token_hash: &str) -> String {
    format!("login_magic_link:{}", token_hash)
}

/// A record together with its exact stored encoding
pub struct Stored<T> {
    pub record: T,
    raw: String,
}

/// Session manager for typed records in the ephemeral store
#[derive(Clone)]
pub struct SessionManager {
    store: Option<Arc<dyn EphemeralStore>>,
}

impl SessionManager {
    /// Create a session manager over an ephemeral store
    pub fn new(store: Arc<dyn EphemeralStore>) -> Self {
        Self { store: Some(store) }
    }

    /// Create a session manager with no backing store
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    async fn put<T: Serialize>(&self, key: &str, record: &T, ttl: Duration) -> AuthResult<()> {
        let Some(store) = &self.store else {
            warn!(key_namespace = namespace(key), "Ephemeral store not configured, dropping write");
            return Ok(());
        };
        let value = serde_json::to_string(record)?;
        store.set(key, &value, Some(ttl.as_secs().max(1))).await?;
        Ok(())
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<Stored<T>>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(raw) = store.get(key).await? else {
            return Ok(None);
        };
        Ok(decode(key, raw))
    }

    async fn remove(&self, key: &str) -> AuthResult<()> {
        if let Some(store) = &self.store {
            store.delete(key).await?;
        }
        Ok(())
    }

    /// Store a signup session
    pub async fn create_signup_session(
        &self,
        session_id: &str,
        record: &SignupSessionRecord,
        ttl: Duration,
    ) -> AuthResult<()> {
        self.put(&signup_session_key(session_id), record, ttl).await
    }

    /// Get a signup session
    pub async fn get_signup_session(&self, session_id: &str) -> AuthResult<Option<SignupSessionRecord>> {
        Ok(self
            .fetch(&signup_session_key(session_id))
            .await?
            .map(|stored| stored.record))
    }

    /// Delete a signup session
    pub async fn delete_signup_session(&self, session_id: &str) -> AuthResult<()> {
        self.remove(&signup_session_key(session_id)).await
    }

    /// Store a main session
    pub async fn create_main_session(
        &self,
        session_id: &str,
        record: &MainSessionRecord,
        ttl: Duration,
    ) -> AuthResult<()> {
        self.put(&main_session_key(session_id), record, ttl).await
    }

    /// Get a main session
    pub async fn get_main_session(&self, session_id: &str) -> AuthResult<Option<MainSessionRecord>> {
        Ok(self
            .fetch(&main_session_key(session_id))
            .await?
            .map(|stored| stored.record))
    }

    /// Delete a main session
    pub async fn delete_main_session(&self, session_id: &str) -> AuthResult<()> {
        self.remove(&main_session_key(session_id)).await
    }

    /// Store a nonce record
    pub async fn store_nonce(&self, nonce: &str, record: &NonceRecord, ttl: Duration) -> AuthResult<()> {
        self.put(&nonce_key(nonce), record, ttl).await
    }

    /// Get a nonce record with its stored encoding
    pub async fn get_nonce(&self, nonce: &str) -> AuthResult<Option<Stored<NonceRecord>>> {
        self.fetch(&nonce_key(nonce)).await
    }

    /// Atomically flip a nonce to used
    ///
    /// Returns `false` if the stored record changed since it was read.
    pub async fn consume_nonce(&self, nonce: &str, current: &Stored<NonceRecord>) -> AuthResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let used = NonceRecord {
            used: true,
            ..current.record.clone()
        };
        let replacement = serde_json::to_string(&used)?;
        Ok(store
            .compare_and_swap(&nonce_key(nonce), &current.raw, &replacement)
            .await?)
    }

    /// Point a session and address at its latest nonce
    pub async fn store_session_nonce(
        &self,
        session_id: &str,
        address: &str,
        nonce: &str,
        ttl: Duration,
    ) -> AuthResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store
            .set(
                &session_nonce_key(session_id, address),
                nonce,
                Some(ttl.as_secs().max(1)),
            )
            .await?;
        Ok(())
    }

    /// Delete the session nonce pointer
    pub async fn delete_session_nonce(&self, session_id: &str, address: &str) -> AuthResult<()> {
        self.remove(&session_nonce_key(session_id, address)).await
    }

    /// Store a login link record
    pub async fn store_login_link(
        &self,
        token_hash: &str,
        record: &LoginLinkRecord,
        ttl: Duration,
    ) -> AuthResult<()> {
        self.put(&login_link_key(token_hash), record, ttl).await
    }

    /// Read and delete a login link record
    pub async fn take_login_link(&self, token_hash: &str) -> AuthResult<Option<LoginLinkRecord>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let key = login_link_key(token_hash);
        let Some(raw) = store.take(&key).await? else {
            return Ok(None);
        };
        Ok(decode(&key, raw).map(|stored| stored.record))
    }
}

fn namespace(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

fn decode<T: DeserializeOwned>(key: &str, raw: String) -> Option<Stored<T>> {
    match serde_json::from_str(&raw) {
        Ok(record) => Some(Stored { record, raw }),
        Err(e) => {
            warn!(key_namespace = namespace(key), "Discarding malformed record: {}", e);
            None
        }
    }
}
