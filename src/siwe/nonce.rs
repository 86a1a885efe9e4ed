//! Single-use nonce ledger
//!
//! Nonces are anonymous: nothing binds a nonce to an address until a signed
//! message referencing it is verified.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::database::NonceStore;
use crate::error::StorageError;

/// A replay-protection token handed out before login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nonce {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl Nonce {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Non-consuming lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    Valid,
    NotFound,
    Expired,
    Consumed,
}

/// Redemption result; at most one concurrent caller sees `Ok`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResult {
    Ok(Nonce),
    NotFound,
    Expired,
    AlreadyUsed,
}

pub struct NonceLedger {
    store: Arc<dyn NonceStore>,
}

impl NonceLedger {
    pub fn new(store: Arc<dyn NonceStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh nonce valid for `ttl`
    pub async fn issue(&self, ttl: Duration) -> Result<Nonce, StorageError> {
        let now = Utc::now();
        let nonce = Nonce {
            value: generate_token(),
            issued_at: now,
            expires_at: now + ttl,
            consumed_at: None,
        };
        self.store.insert(&nonce).await?;
        debug!(expires_at = %nonce.expires_at, "Issued nonce");
        Ok(nonce)
    }

    /// Check that a nonce exists, is unredeemed and unexpired, without redeeming it
    pub async fn check(&self, value: &str, now: DateTime<Utc>) -> Result<NonceStatus, StorageError> {
        Ok(match self.store.get(value).await? {
            None => NonceStatus::NotFound,
            Some(nonce) if nonce.consumed_at.is_some() => NonceStatus::Consumed,
            Some(nonce) if nonce.is_expired(now) => NonceStatus::Expired,
            Some(_) => NonceStatus::Valid,
        })
    }

    /// Atomically redeem a nonce. An expired nonce is burned as well.
    pub async fn consume(&self, value: &str, now: DateTime<Utc>) -> Result<ConsumeResult, StorageError> {
        match self.store.redeem(value, now).await? {
            Some(nonce) if nonce.is_expired(now) => Ok(ConsumeResult::Expired),
            Some(nonce) => Ok(ConsumeResult::Ok(nonce)),
            // Lost the redemption or never issued; the follow-up read only classifies
            None => Ok(match self.store.get(value).await? {
                Some(_) => ConsumeResult::AlreadyUsed,
                None => ConsumeResult::NotFound,
            }),
        }
    }

    /// Drop expired nonces, redeemed or not
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let purged = self.store.purge_expired(now).await?;
        if purged > 0 {
            debug!("Purged {} expired nonces", purged);
        }
        Ok(purged)
    }
}

/// 128 bits from the OS CSPRNG, hex encoded
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
