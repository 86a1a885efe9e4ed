//! Reputation System
//!
//! Tracks verification outcomes per address and maps them onto a trust tier.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Orchestrator    │────►│ ReputationEngine │────►│ ReputationStore  │
//! │ (outcomes)      │     │ (config, API)    │     │ (per-address RMW)│
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!                                  │
//!                                  ▼
//!                          ┌──────────────────┐
//!                          │ score::evaluate  │
//!                          │ (pure law)       │
//!                          └──────────────────┘
//! ```
//!
//! ## Tiers
//!
//! - `blocked`   - failure count reached `blocked_failure_count` (overrides score)
//! - `trusted`   - score >= `trusted_threshold`
//! - `probation` - score < `probation_threshold`
//! - `active`    - everything else

mod manager;
mod score;

pub use manager::ReputationEngine;
pub use score::{
    Outcome, ReputationHistory, ReputationRecord, ReputationStatus, ScoringConfig, Standing,
    evaluate,
};
