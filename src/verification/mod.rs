//! Login verification
//!
//! Sequences signature, nonce and ENS checks for one login attempt and binds the
//! referral when all of them pass.

mod orchestrator;
mod rejection;

pub use orchestrator::{LoginAccepted, LoginRequest, VerificationOrchestrator, VerifyError};
pub use rejection::Rejection;
