//! Nonce Repository
//!
//! Redemption is a single conditional `UPDATE ... RETURNING`, so two concurrent
//! redeemers of the same value cannot both get the row back. Redeemed rows stay as
//! tombstones until they expire, which lets a replay be told apart from a typo.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use tracing::info;

use crate::database::NonceStore;
use crate::error::StorageError;
use crate::siwe::Nonce;

pub struct NonceRepository {
    pool: PgPool,
}

impl NonceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nonces (
                nonce VARCHAR(64) PRIMARY KEY,
                issued_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMP WITH TIME ZONE NOT NULL,
                consumed_at TIMESTAMP WITH TIME ZONE
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_nonces_expires ON nonces(expires_at)")
            .execute(&self.pool)
            .await?;

        info!("Nonce table ready");
        Ok(())
    }
}

fn nonce_from_row(row: &PgRow) -> Result<Nonce, StorageError> {
    Ok(Nonce {
        value: row.try_get("nonce")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        consumed_at: row.try_get("consumed_at")?,
    })
}

#[async_trait]
impl NonceStore for NonceRepository {
    async fn insert(&self, nonce: &Nonce) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO nonces (nonce, issued_at, expires_at) VALUES ($1, $2, $3)")
            .bind(&nonce.value)
            .bind(nonce.issued_at)
            .bind(nonce.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, value: &str) -> Result<Option<Nonce>, StorageError> {
        let row = sqlx::query("SELECT nonce, issued_at, expires_at, consumed_at FROM nonces WHERE nonce = $1")
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(nonce_from_row).transpose()
    }

    async fn redeem(&self, value: &str, at: DateTime<Utc>) -> Result<Option<Nonce>, StorageError> {
        let row = sqlx::query(
            r#"
            UPDATE nonces SET consumed_at = $2
            WHERE nonce = $1 AND consumed_at IS NULL
            RETURNING nonce, issued_at, expires_at, consumed_at
        "#,
        )
        .bind(value)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(nonce_from_row).transpose()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM nonces WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
