//! Signature verification for SIWE logins
//!
//! Pure parsing + secp256k1 recovery. Nonce existence and expiry are checked by the
//! verification orchestrator, not here.

use alloy_primitives::{Address, eip191_hash_message, keccak256};
use chrono::{DateTime, Utc};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use thiserror::Error;

use super::message::{MessageError, SiweMessage};
use super::normalize_address;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed SIWE message: {0}")]
    Malformed(#[from] MessageError),

    #[error("signature does not match the declared address")]
    Invalid,

    #[error("message uri {uri} does not match origin {expected}")]
    OriginMismatch {
        uri: String,
        expected: String,
        signer: String,
    },

    #[error("message expired at {expired_at}")]
    Expired {
        expired_at: DateTime<Utc>,
        signer: String,
    },

    #[error("message is not valid before {not_before}")]
    NotYetValid {
        not_before: DateTime<Utc>,
        signer: String,
    },
}

impl SignatureError {
    /// The proven signer, when the failure happened after recovery succeeded.
    ///
    /// `Invalid` returns `None` even when some key was recovered: a forged signature
    /// over someone else's message recovers to an arbitrary address, and charging
    /// that address (or the declared one) would let anyone drive down another
    /// wallet's reputation.
    pub fn signer(&self) -> Option<&str> {
        match self {
            SignatureError::OriginMismatch { signer, .. }
            | SignatureError::Expired { signer, .. }
            | SignatureError::NotYetValid { signer, .. } => Some(signer),
            SignatureError::Malformed(_) | SignatureError::Invalid => None,
        }
    }
}

/// A message whose signature recovered to its declared address
#[derive(Debug, Clone)]
pub struct VerifiedLogin {
    /// Canonical lowercase address of the signer
    pub address: String,
    pub declared_nonce: String,
    pub message: SiweMessage,
}

/// Verifies SIWE messages addressed to one deployment origin
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    expected_origin: String,
}

impl SignatureVerifier {
    pub fn new(expected_origin: impl Into<String>) -> Self {
        Self {
            expected_origin: expected_origin.into(),
        }
    }

    pub fn expected_origin(&self) -> &str {
        &self.expected_origin
    }

    pub fn verify(
        &self,
        raw_message: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedLogin, SignatureError> {
        let message: SiweMessage = raw_message.parse()?;

        let recovered = recover_signer(raw_message, signature)?;
        if recovered != message.address {
            return Err(SignatureError::Invalid);
        }
        let signer = normalize_address(&recovered);

        if !message.uri.is_empty() && message.uri != self.expected_origin {
            return Err(SignatureError::OriginMismatch {
                uri: message.uri.clone(),
                expected: self.expected_origin.clone(),
                signer,
            });
        }

        if let Some(expired_at) = message.expiration_time.filter(|_| message.is_expired(now)) {
            return Err(SignatureError::Expired { expired_at, signer });
        }

        if let Some(not_before) = message.not_before.filter(|_| message.is_not_yet_valid(now)) {
            return Err(SignatureError::NotYetValid { not_before, signer });
        }

        Ok(VerifiedLogin {
            address: signer,
            declared_nonce: message.nonce.clone(),
            message,
        })
    }
}

/// Recover the address that produced an EIP-191 personal signature over `message`.
///
/// Accepts a 65-byte `r || s || v` hex string with `v` in {0, 1, 27, 28}.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, SignatureError> {
    let hex_sig = signature.trim();
    let bytes = hex::decode(hex_sig.strip_prefix("0x").unwrap_or(hex_sig))
        .map_err(|_| SignatureError::Invalid)?;
    if bytes.len() != 65 {
        return Err(SignatureError::Invalid);
    }

    let mut sig = Signature::from_slice(&bytes[..64]).map_err(|_| SignatureError::Invalid)?;
    let parity = match bytes[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::Invalid),
    };
    let mut recovery_id = RecoveryId::from_byte(parity).ok_or(SignatureError::Invalid)?;

    // k256 only verifies low-S signatures; flip parity along with s
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let prehash = eip191_hash_message(message);
    let key = VerifyingKey::recover_from_prehash(prehash.as_slice(), &sig, recovery_id)
        .map_err(|_| SignatureError::Invalid)?;

    Ok(address_from_key(&key))
}

/// Ethereum address of a secp256k1 public key
pub fn address_from_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}
