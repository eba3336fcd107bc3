//! Wallet signature verification
//!
//! Recovers the signing account from a personal-message signature and
//! compares it to the claimed address.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{AuthError, AuthResult};

const SIGNATURE_LENGTH: usize = 65;

/// Hash a message with the personal-message prefix
pub fn hash_personal_message(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Derive the lower-cased `0x` account address of a public key
pub fn address_from_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Recover the signing address of `message`
///
/// Fails with `InvalidSignatureFormat` unless the signature decodes to
/// exactly 65 bytes, and with `InvalidSignature` when no key can be recovered.
pub fn recover_address(message: &str, signature: &str) -> AuthResult<String> {
    let raw = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(raw).map_err(|_| AuthError::InvalidSignatureFormat)?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(AuthError::InvalidSignatureFormat);
    }

    let mut v = bytes[64];
    if v >= 27 {
        v -= 27;
    }
    let mut recovery_id = RecoveryId::from_byte(v).ok_or(AuthError::InvalidSignature)?;

    let mut sig = Signature::from_slice(&bytes[..64]).map_err(|_| AuthError::InvalidSignature)?;
    // Recovery only accepts low-s; flipping s flips the parity of R.y.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let digest = hash_personal_message(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| AuthError::InvalidSignature)?;

    Ok(address_from_key(&key))
}

/// Check that `signature` over `message` was produced by `address`
pub fn verify_signature(address: &str, message: &str, signature: &str) -> AuthResult<()> {
    let recovered = recover_address(message, signature)?;
    if recovered.eq_ignore_ascii_case(address) {
        Ok(())
    } else {
        Err(AuthError::InvalidSignature)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use k256::ecdsa::SigningKey;

    /// Deterministic wallet for tests
    pub fn wallet(seed: u8) -> SigningKey {
        let mut secret = [0u8; 32];
        secret[31] = seed.max(1);
        secret[0] = 0x42;
        SigningKey::from_slice(&secret).expect("valid test key")
    }

    pub fn address_of(key: &SigningKey) -> String {
        address_from_key(key.verifying_key())
    }

    /// Produce a `0x`-prefixed 65-byte signature with `v` in {27, 28}
    pub fn sign(key: &SigningKey, message: &str) -> String {
        let digest = hash_personal_message(message);
        let (sig, recovery_id) = key
            .sign_prehash_recoverable(&digest)
            .expect("signing succeeds");
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}
