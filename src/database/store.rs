//! Storage seams
//!
//! Each trait has a PostgreSQL repository and an in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::referral::{AttributedEvent, EventView, NewAttributedEvent, NewReferralBinding, ReferralBinding};
use crate::reputation::{Outcome, ReputationHistory, ReputationRecord, ScoringConfig};
use crate::siwe::Nonce;

#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn insert(&self, nonce: &Nonce) -> Result<(), StorageError>;

    async fn get(&self, value: &str) -> Result<Option<Nonce>, StorageError>;

    /// Set `consumed_at` if unset and return the redeemed record, in one atomic step.
    /// `None` when the nonce is unknown or was already redeemed.
    async fn redeem(&self, value: &str, at: DateTime<Utc>) -> Result<Option<Nonce>, StorageError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn insert_binding(&self, binding: NewReferralBinding) -> Result<ReferralBinding, StorageError>;

    async fn latest_binding(&self, referral_code: &str) -> Result<Option<ReferralBinding>, StorageError>;

    async fn insert_event(&self, event: NewAttributedEvent) -> Result<AttributedEvent, StorageError>;

    async fn recent_events(&self, limit: u32, offset: u32) -> Result<Vec<EventView>, StorageError>;
}

#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Append `outcome` and recompute the record, serialized per address
    async fn record(
        &self,
        address: &str,
        outcome: &Outcome,
        at: DateTime<Utc>,
        config: &ScoringConfig,
    ) -> Result<ReputationRecord, StorageError>;

    /// Cumulative counters plus events at or after `window_start`
    async fn load(
        &self,
        address: &str,
        window_start: DateTime<Utc>,
    ) -> Result<ReputationHistory, StorageError>;

    /// Delete windowed events older than `before`
    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StorageError>;
}
