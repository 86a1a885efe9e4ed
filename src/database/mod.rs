//! Persistence
//!
//! Storage traits for nonces, referrals and reputation, with PostgreSQL repositories
//! and in-memory implementations behind them.

pub mod memory;
pub mod nonces;
pub mod pool;
pub mod referrals;
pub mod reputation;
mod store;

pub use nonces::NonceRepository;
pub use pool::DatabasePool;
pub use referrals::ReferralRepository;
pub use reputation::ReputationRepository;
pub use store::{NonceStore, ReferralStore, ReputationStore};
