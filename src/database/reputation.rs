//! Reputation Repository - Database operations for the reputation engine
//!
//! Cumulative counters live in `reputation_records`; every outcome is also appended to
//! `reputation_events` so the rate window can be counted. `record` runs in a single
//! transaction holding a row lock on the address, which is what serializes concurrent
//! outcomes for the same address across processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::database::ReputationStore;
use crate::error::StorageError;
use crate::reputation::{Outcome, ReputationHistory, ReputationRecord, ScoringConfig, evaluate};

pub struct ReputationRepository {
    pool: PgPool,
}

fn to_db_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn from_db_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

impl ReputationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize reputation tables
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        info!("Initializing reputation tables...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reputation_records (
                address VARCHAR(42) PRIMARY KEY,
                score INTEGER NOT NULL,
                status VARCHAR(16) NOT NULL,
                success_count BIGINT NOT NULL DEFAULT 0,
                failure_count BIGINT NOT NULL DEFAULT 0,
                has_verified_ens BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reputation_events (
                id BIGSERIAL PRIMARY KEY,
                address VARCHAR(42) NOT NULL,
                outcome VARCHAR(16) NOT NULL,
                reason TEXT,
                occurred_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reputation_events_address ON reputation_events(address, occurred_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Reputation tables initialized");
        Ok(())
    }
}

#[async_trait]
impl ReputationStore for ReputationRepository {
    async fn record(
        &self,
        address: &str,
        outcome: &Outcome,
        at: DateTime<Utc>,
        config: &ScoringConfig,
    ) -> Result<ReputationRecord, StorageError> {
        let mut tx = self.pool.begin().await?;

        let initial = evaluate(&ReputationHistory::default(), config);
        sqlx::query(
            r#"
            INSERT INTO reputation_records (address, score, status, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (address) DO NOTHING
        "#,
        )
        .bind(address)
        .bind(initial.score)
        .bind(initial.status.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT success_count, failure_count, has_verified_ens
            FROM reputation_records
            WHERE address = $1
            FOR UPDATE
        "#,
        )
        .bind(address)
        .fetch_one(&mut *tx)
        .await?;

        let mut history = ReputationHistory {
            success_count: from_db_count(row.try_get("success_count")?),
            failure_count: from_db_count(row.try_get("failure_count")?),
            has_verified_ens: row.try_get("has_verified_ens")?,
            events_in_window: 0,
        };
        history.apply(outcome);

        let reason = match outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason } => Some(reason.as_str()),
        };
        sqlx::query(
            "INSERT INTO reputation_events (address, outcome, reason, occurred_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(address)
        .bind(outcome.kind())
        .bind(reason)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let window_start = at - config.rate_window();
        let in_window: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reputation_events WHERE address = $1 AND occurred_at >= $2",
        )
        .bind(address)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;
        history.events_in_window = from_db_count(in_window);

        let record = ReputationRecord::from_history(address, &history, config, at);

        sqlx::query(
            r#"
            UPDATE reputation_records
            SET score = $2, status = $3, success_count = $4, failure_count = $5,
                has_verified_ens = $6, updated_at = $7
            WHERE address = $1
        "#,
        )
        .bind(address)
        .bind(record.score)
        .bind(record.status.as_str())
        .bind(to_db_count(record.success_count))
        .bind(to_db_count(record.failure_count))
        .bind(record.has_verified_ens)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            "Recorded {} for {}: score {} ({})",
            outcome.kind(),
            address,
            record.score,
            record.status
        );
        Ok(record)
    }

    async fn load(
        &self,
        address: &str,
        window_start: DateTime<Utc>,
    ) -> Result<ReputationHistory, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT success_count, failure_count, has_verified_ens
            FROM reputation_records
            WHERE address = $1
        "#,
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ReputationHistory::default());
        };

        let in_window: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reputation_events WHERE address = $1 AND occurred_at >= $2",
        )
        .bind(address)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReputationHistory {
            success_count: from_db_count(row.try_get("success_count")?),
            failure_count: from_db_count(row.try_get("failure_count")?),
            has_verified_ens: row.try_get("has_verified_ens")?,
            events_in_window: from_db_count(in_window),
        })
    }

    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM reputation_events WHERE occurred_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        let count = result.rows_affected();
        if count > 0 {
            debug!("Compacted {} reputation events", count);
        }
        Ok(count)
    }
}
