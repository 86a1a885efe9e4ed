//! Reputation Engine - records verification outcomes and serves scores
//!
//! Per-address serialization lives in the store: a row lock inside one transaction
//! for PostgreSQL, a per-address async mutex for the in-memory store.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::ReputationStore;
use crate::error::StorageError;
use crate::reputation::{Outcome, ReputationRecord, ScoringConfig};

pub struct ReputationEngine {
    store: Arc<dyn ReputationStore>,
    config: ScoringConfig,
}

impl ReputationEngine {
    /// Build an engine; rejects inconsistent scoring parameters.
    pub fn new(store: Arc<dyn ReputationStore>, config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Append an outcome for `address` and return the recomputed record.
    ///
    /// Storage errors are returned to the caller, which decides whether to retry.
    pub async fn record_outcome(
        &self,
        address: &str,
        outcome: Outcome,
        at: DateTime<Utc>,
    ) -> Result<ReputationRecord, StorageError> {
        let record = self.store.record(address, &outcome, at, &self.config).await?;

        debug!(
            address = %address,
            outcome = outcome.kind(),
            score = record.score,
            status = %record.status,
            "Recorded reputation outcome"
        );

        Ok(record)
    }

    /// Current score for `address` evaluated at `now`. Never mutates.
    pub async fn get_score(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<ReputationRecord, StorageError> {
        let window_start = now - self.config.rate_window();
        let history = self.store.load(address, window_start).await?;
        Ok(ReputationRecord::from_history(
            address,
            &history,
            &self.config,
            now,
        ))
    }

    /// Drop windowed event history that can no longer affect any score
    pub async fn compact(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let cutoff = now - self.config.rate_window();
        let removed = self.store.compact(cutoff).await?;
        if removed > 0 {
            info!("Compacted {} reputation events older than {}", removed, cutoff);
        }
        Ok(removed)
    }
}
