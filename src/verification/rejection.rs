//! Login rejections
//!
//! Everything here is the caller's to fix. Each rejection knows its error class, a
//! stable code for reputation history, and the JSON body returned to the client.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

use crate::ens::{IdentityRejection, responses};
use crate::error::ErrorKind;
use crate::siwe::SignatureError;

const FRESH_NONCE: &str = "Request a new nonce from /api/nonce and sign a new message";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Missing required fields: message, signature, referralCode")]
    MissingFields,

    #[error("Invalid SIWE message: {0}")]
    MessageMalformed(String),

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("SIWE message uri does not match server ORIGIN ({expected})")]
    OriginMismatch { uri: String, expected: String },

    #[error("SIWE message has expired")]
    MessageExpired { expired_at: DateTime<Utc> },

    #[error("SIWE message is not yet valid")]
    MessageNotYetValid { not_before: DateTime<Utc> },

    #[error("Invalid or missing nonce")]
    NonceMissing,

    #[error("Nonce expired")]
    NonceExpired,

    #[error("Nonce already used")]
    NonceAlreadyUsed,

    #[error(transparent)]
    Identity(IdentityRejection),
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::MissingFields | Rejection::MessageMalformed(_) => ErrorKind::ClientInput,
            Rejection::SignatureInvalid
            | Rejection::OriginMismatch { .. }
            | Rejection::MessageExpired { .. }
            | Rejection::MessageNotYetValid { .. }
            | Rejection::NonceMissing
            | Rejection::NonceExpired
            | Rejection::NonceAlreadyUsed => ErrorKind::AuthenticationRejected,
            Rejection::Identity(_) => ErrorKind::IdentityVerificationFailed,
        }
    }

    /// Stable identifier stored as the failure reason in reputation history
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::MissingFields => "missing_fields",
            Rejection::MessageMalformed(_) => "message_malformed",
            Rejection::SignatureInvalid => "signature_invalid",
            Rejection::OriginMismatch { .. } => "origin_mismatch",
            Rejection::MessageExpired { .. } => "message_expired",
            Rejection::MessageNotYetValid { .. } => "message_not_yet_valid",
            Rejection::NonceMissing => "nonce_missing",
            Rejection::NonceExpired => "nonce_expired",
            Rejection::NonceAlreadyUsed => "nonce_already_used",
            Rejection::Identity(IdentityRejection::NotResolved { .. }) => "ens_not_resolved",
            Rejection::Identity(IdentityRejection::Mismatch { .. }) => "ens_mismatch",
            Rejection::Identity(IdentityRejection::ReverseMissing { .. }) => "reverse_ens_missing",
            Rejection::Identity(IdentityRejection::ReverseMismatch { .. }) => "reverse_ens_mismatch",
        }
    }

    pub fn body(&self) -> Value {
        let error = self.to_string();
        match self {
            Rejection::MissingFields => json!({
                "success": false,
                "error": error,
                "suggestion": "Include message, signature and referralCode in the request body",
            }),
            Rejection::MessageMalformed(_) => json!({
                "success": false,
                "error": error,
                "suggestion": "Sign a well-formed EIP-4361 message",
            }),
            Rejection::SignatureInvalid => json!({
                "success": false,
                "error": error,
                "suggestion": "Sign the exact message text with the address it declares",
            }),
            Rejection::OriginMismatch { uri, expected } => json!({
                "success": false,
                "error": error,
                "uri": uri,
                "expectedOrigin": expected,
                "suggestion": "Sign a message created for this site",
            }),
            Rejection::MessageExpired { expired_at } => json!({
                "success": false,
                "error": error,
                "expirationTime": expired_at,
                "suggestion": FRESH_NONCE,
            }),
            Rejection::MessageNotYetValid { not_before } => json!({
                "success": false,
                "error": error,
                "notBefore": not_before,
                "suggestion": "Retry after the notBefore time or sign a new message",
            }),
            Rejection::NonceMissing | Rejection::NonceExpired | Rejection::NonceAlreadyUsed => {
                json!({
                    "success": false,
                    "error": error,
                    "suggestion": FRESH_NONCE,
                })
            }
            Rejection::Identity(identity) => match identity {
                IdentityRejection::NotResolved { ens } => responses::ens_not_resolved(ens),
                IdentityRejection::Mismatch {
                    ens,
                    expected_address,
                    resolved_address,
                } => responses::ens_mismatch(ens, expected_address, resolved_address),
                IdentityRejection::ReverseMissing { address } => {
                    responses::reverse_ens_missing(address)
                }
                IdentityRejection::ReverseMismatch {
                    address,
                    expected_ens,
                    reverse_ens,
                } => responses::reverse_ens_mismatch(address, expected_ens, reverse_ens),
            },
        }
    }
}

impl From<&SignatureError> for Rejection {
    fn from(err: &SignatureError) -> Self {
        match err {
            SignatureError::Malformed(e) => Rejection::MessageMalformed(e.to_string()),
            SignatureError::Invalid => Rejection::SignatureInvalid,
            SignatureError::OriginMismatch { uri, expected, .. } => Rejection::OriginMismatch {
                uri: uri.clone(),
                expected: expected.clone(),
            },
            SignatureError::Expired { expired_at, .. } => Rejection::MessageExpired {
                expired_at: *expired_at,
            },
            SignatureError::NotYetValid { not_before, .. } => Rejection::MessageNotYetValid {
                not_before: *not_before,
            },
        }
    }
}

impl From<IdentityRejection> for Rejection {
    fn from(rejection: IdentityRejection) -> Self {
        Rejection::Identity(rejection)
    }
}
