//! SIWE Referral Service
//!
//! Wallet sign-in (EIP-4361) with optional ENS identity binding, referral attribution and
//! per-address reputation scoring.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs          - Crate root with re-exports
//! ├── main.rs         - Server entrypoint
//! ├── config.rs       - Configuration management
//! ├── error.rs        - Shared error types and failure policies
//! ├── siwe/           - Sign-In-With-Ethereum
//! │   ├── message.rs   - EIP-4361 message parsing
//! │   ├── signature.rs - Signer recovery, origin and expiry checks
//! │   └── nonce.rs     - Single-use nonce ledger
//! ├── ens/            - ENS identity checks
//! │   ├── rpc.rs       - JSON-RPC registry resolver
//! │   └── responses.rs - ENS response bodies
//! ├── verification/   - Login pipeline
//! │   ├── orchestrator.rs
//! │   └── rejection.rs
//! ├── referral/       - Referral bindings and attributed events
//! ├── reputation/     - Outcome tracking and trust tiers
//! │   ├── score.rs     - Scoring law
//! │   └── manager.rs   - Reputation engine
//! ├── api/            - HTTP API endpoints and middleware
//! └── database/       - PostgreSQL repositories and in-memory stores
//! ```

pub mod api;
pub mod config;
pub mod database;
pub mod ens;
pub mod error;
pub mod referral;
pub mod reputation;
pub mod siwe;
pub mod verification;

// Re-export main types for convenience
pub use config::ServiceConfig;
pub use database::DatabasePool;
pub use ens::{IdentityResolver, NameResolver, RpcNameResolver};
pub use error::{ErrorKind, FailurePolicy, ResolverError, StorageError};
pub use referral::{ReferralLedger, RequestMetadata};
pub use reputation::{Outcome, ReputationEngine, ReputationRecord, ReputationStatus, ScoringConfig};
pub use siwe::{NonceLedger, SignatureVerifier, SiweMessage};
pub use verification::{LoginAccepted, LoginRequest, Rejection, VerificationOrchestrator, VerifyError};

// Re-export API types
pub use api::{AppState, MiddlewareState, create_router};
