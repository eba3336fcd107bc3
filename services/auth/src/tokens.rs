//! One-time secrets: magic link tokens, wallet nonces and session ids
//!
//! Every secret is 256 bits from the operating system RNG, hex encoded.
//! Magic link tokens are only ever persisted as their SHA-256 hash; the raw
//! value goes out in the email and nowhere else.

use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::{AuthError, AuthResult};

const SECRET_BYTES: usize = 32;

fn random_hex() -> AuthResult<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::Internal(format!("failed to generate random bytes: {}", e)))?;
    Ok(hex::encode(bytes))
}

/// Create a raw magic link token
pub fn generate_token() -> AuthResult<String> {
    random_hex()
}

/// Create a wallet-auth nonce (`0x`-prefixed)
pub fn generate_nonce() -> AuthResult<String> {
    Ok(format!("0x{}", random_hex()?))
}

/// Create an opaque session id
pub fn generate_session_id() -> AuthResult<String> {
    random_hex()
}

/// Hash a token so the raw value never touches a store
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the frontend verification link included in outbound emails
pub fn build_magic_link_url(frontend_url: &str, token: &str) -> String {
    format!(
        "{}/auth/verify?token={}",
        frontend_url.trim_end_matches('/'),
        token
    )
}
