//! Shared error types and failure policies
//!
//! Store and resolver faults are infrastructure problems and never the caller's fault.
//! Everything the caller can fix is modelled as a `Rejection` in the verification module.

use serde::Serialize;
use thiserror::Error;

/// Persistence failure (nonce, referral or reputation store)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Name resolution failure, distinct from a clean "not registered" answer
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("resolver unavailable: {0}")]
    Unavailable(String),

    #[error("malformed resolver response: {0}")]
    InvalidResponse(String),
}

/// Caller-facing error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input, caller fixes the request and retries
    ClientInput,
    /// Signature, origin or nonce problem, caller restarts login with a fresh nonce
    AuthenticationRejected,
    /// ENS forward/reverse records do not back the claim
    IdentityVerificationFailed,
    /// Bad shared secret
    Unauthorized,
    /// Store or resolver unreachable, safe to retry
    InfrastructureFault,
}

/// What a gate or check does when its own infrastructure is unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the request through and log
    FailOpen,
    /// Treat the check as failed
    FailClosed,
}

/// Rate limiting must not take the login flow down with it.
pub const RATE_GATE_FAILURE_POLICY: FailurePolicy = FailurePolicy::FailOpen;

/// A required reverse ENS proof that cannot be checked is not a proof.
pub const REVERSE_ENS_FAILURE_POLICY: FailurePolicy = FailurePolicy::FailClosed;
