//! Error taxonomy for the authentication pipeline

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::{CacheError, DatabaseError};
use serde_json::json;
use thiserror::Error;

/// Errors returned by the authentication pipeline
#[derive(Error, Debug)]
pub enum AuthError {
    /// A user already owns this email
    #[error("email already exists")]
    EmailAlreadyRegistered,

    /// The credential store cannot run transactions
    #[error("store does not support transactions")]
    InvalidStoreBackend,

    /// Magic link token unknown, used, expired or superseded
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// Session missing, expired or malformed
    #[error("invalid or expired session")]
    InvalidOrExpiredSession,

    /// Nonce missing, expired, used or bound elsewhere
    #[error("invalid or expired nonce")]
    InvalidOrExpiredNonce,

    /// The signature does not recover the claimed address
    #[error("invalid signature")]
    InvalidSignature,

    /// The signature is not 65 hex-encoded bytes
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    /// The address is already bound to a user
    #[error("wallet address already linked to another user")]
    WalletAlreadyLinked,

    /// Request input failed validation
    #[error("{0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status the error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::EmailAlreadyRegistered
            | AuthError::WalletAlreadyLinked
            | AuthError::InvalidSignatureFormat
            | AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidOrExpiredToken
            | AuthError::InvalidOrExpiredSession
            | AuthError::InvalidOrExpiredNonce
            | AuthError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AuthError::InvalidStoreBackend
            | AuthError::Database(_)
            | AuthError::Cache(_)
            | AuthError::Serialization(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.public_message(),
        }));

        (self.status_code(), body).into_response()
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;
