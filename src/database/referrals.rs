//! Referral Repository - bindings and attributed events

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use tracing::info;

use crate::database::ReferralStore;
use crate::error::StorageError;
use crate::referral::{
    AttributedEvent, EventView, NewAttributedEvent, NewReferralBinding, ReferralBinding,
    RequestMetadata,
};

pub struct ReferralRepository {
    pool: PgPool,
}

impl ReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS referrals (
                id UUID PRIMARY KEY,
                referral_code VARCHAR(255) NOT NULL,
                referrer_address VARCHAR(42) NOT NULL,
                referrer_ens VARCHAR(255),
                signature TEXT NOT NULL,
                siwe_message TEXT NOT NULL,
                nonce VARCHAR(64) NOT NULL,
                ip_address VARCHAR(64),
                user_agent TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attributed_events (
                id UUID PRIMARY KEY,
                referral_id UUID NOT NULL REFERENCES referrals(id),
                user_id VARCHAR(255),
                event_type VARCHAR(255) NOT NULL,
                event_payload JSONB,
                amount DOUBLE PRECISION,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_referrals_code_created ON referrals(referral_code, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_attributed_events_created ON attributed_events(created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        info!("Referral tables ready");
        Ok(())
    }
}

fn binding_from_row(row: &PgRow) -> Result<ReferralBinding, StorageError> {
    Ok(ReferralBinding {
        id: row.try_get("id")?,
        referral_code: row.try_get("referral_code")?,
        referrer_address: row.try_get("referrer_address")?,
        referrer_ens: row.try_get("referrer_ens")?,
        signature: row.try_get("signature")?,
        raw_message: row.try_get("siwe_message")?,
        nonce: row.try_get("nonce")?,
        metadata: RequestMetadata {
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ReferralStore for ReferralRepository {
    async fn insert_binding(&self, binding: NewReferralBinding) -> Result<ReferralBinding, StorageError> {
        let stored = ReferralBinding::from_new(binding, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO referrals
                (id, referral_code, referrer_address, referrer_ens, signature, siwe_message,
                 nonce, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
        )
        .bind(stored.id)
        .bind(&stored.referral_code)
        .bind(&stored.referrer_address)
        .bind(&stored.referrer_ens)
        .bind(&stored.signature)
        .bind(&stored.raw_message)
        .bind(&stored.nonce)
        .bind(&stored.metadata.ip_address)
        .bind(&stored.metadata.user_agent)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn latest_binding(&self, referral_code: &str) -> Result<Option<ReferralBinding>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, referral_code, referrer_address, referrer_ens, signature, siwe_message,
                   nonce, ip_address, user_agent, created_at
            FROM referrals
            WHERE referral_code = $1
            ORDER BY created_at DESC
            LIMIT 1
        "#,
        )
        .bind(referral_code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(binding_from_row).transpose()
    }

    async fn insert_event(&self, event: NewAttributedEvent) -> Result<AttributedEvent, StorageError> {
        let stored = AttributedEvent::from_new(event, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO attributed_events
                (id, referral_id, user_id, event_type, event_payload, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        )
        .bind(stored.id)
        .bind(stored.referral_id)
        .bind(&stored.user_id)
        .bind(&stored.event_type)
        .bind(&stored.payload)
        .bind(stored.amount)
        .bind(stored.created_at)
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn recent_events(&self, limit: u32, offset: u32) -> Result<Vec<EventView>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT ae.id, ae.event_type, ae.event_payload, ae.amount, ae.created_at,
                   r.referral_code, r.referrer_ens, r.referrer_address
            FROM attributed_events ae
            JOIN referrals r ON ae.referral_id = r.id
            ORDER BY ae.created_at DESC
            LIMIT $1 OFFSET $2
        "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(EventView {
                    id: row.try_get("id")?,
                    event_type: row.try_get("event_type")?,
                    event_payload: row.try_get("event_payload")?,
                    amount: row.try_get("amount")?,
                    created_at: row.try_get("created_at")?,
                    referral_code: row.try_get("referral_code")?,
                    referrer_ens: row.try_get("referrer_ens")?,
                    referrer_address: row.try_get("referrer_address")?,
                })
            })
            .collect()
    }
}
