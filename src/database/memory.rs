//! In-memory stores
//!
//! Used when no `DATABASE_URL` is configured and throughout the tests. State is lost
//! on restart and not shared between processes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::database::{NonceStore, ReferralStore, ReputationStore};
use crate::error::StorageError;
use crate::referral::{
    AttributedEvent, EventView, NewAttributedEvent, NewReferralBinding, ReferralBinding,
};
use crate::reputation::{Outcome, ReputationHistory, ReputationRecord, ScoringConfig};
use crate::siwe::Nonce;

// ============================================================================
// Nonces
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    nonces: DashMap<String, Nonce>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn insert(&self, nonce: &Nonce) -> Result<(), StorageError> {
        self.nonces.insert(nonce.value.clone(), nonce.clone());
        Ok(())
    }

    async fn get(&self, value: &str) -> Result<Option<Nonce>, StorageError> {
        Ok(self.nonces.get(value).map(|n| n.value().clone()))
    }

    async fn redeem(&self, value: &str, at: DateTime<Utc>) -> Result<Option<Nonce>, StorageError> {
        // The shard write lock is held for the whole check-and-set
        let Some(mut nonce) = self.nonces.get_mut(value) else {
            return Ok(None);
        };
        if nonce.consumed_at.is_some() {
            return Ok(None);
        }
        nonce.consumed_at = Some(at);
        Ok(Some(nonce.clone()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut purged = 0u64;
        self.nonces.retain(|_, nonce| {
            let keep = !nonce.is_expired(now);
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }
}

// ============================================================================
// Referrals
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryReferralStore {
    bindings: RwLock<Vec<ReferralBinding>>,
    events: RwLock<Vec<AttributedEvent>>,
}

impl MemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReferralStore for MemoryReferralStore {
    async fn insert_binding(&self, binding: NewReferralBinding) -> Result<ReferralBinding, StorageError> {
        let stored = ReferralBinding::from_new(binding, Utc::now());
        self.bindings.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn latest_binding(&self, referral_code: &str) -> Result<Option<ReferralBinding>, StorageError> {
        let bindings = self.bindings.read().await;
        Ok(bindings
            .iter()
            .rev()
            .find(|b| b.referral_code == referral_code)
            .cloned())
    }

    async fn insert_event(&self, event: NewAttributedEvent) -> Result<AttributedEvent, StorageError> {
        let known = self
            .bindings
            .read()
            .await
            .iter()
            .any(|b| b.id == event.referral_id);
        if !known {
            return Err(StorageError::Corrupt(format!(
                "event references unknown referral {}",
                event.referral_id
            )));
        }

        let stored = AttributedEvent::from_new(event, Utc::now());
        self.events.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn recent_events(&self, limit: u32, offset: u32) -> Result<Vec<EventView>, StorageError> {
        let bindings = self.bindings.read().await;
        let events = self.events.read().await;

        Ok(events
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|event| {
                bindings
                    .iter()
                    .find(|b| b.id == event.referral_id)
                    .map(|binding| EventView {
                        id: event.id,
                        event_type: event.event_type.clone(),
                        event_payload: event.payload.clone(),
                        amount: event.amount,
                        created_at: event.created_at,
                        referral_code: binding.referral_code.clone(),
                        referrer_ens: binding.referrer_ens.clone(),
                        referrer_address: binding.referrer_address.clone(),
                    })
            })
            .collect())
    }
}

// ============================================================================
// Reputation
// ============================================================================

#[derive(Debug, Default)]
struct AddressLog {
    counters: ReputationHistory,
    events: VecDeque<DateTime<Utc>>,
}

impl AddressLog {
    fn history(&self, window_start: DateTime<Utc>) -> ReputationHistory {
        ReputationHistory {
            events_in_window: self.events.iter().filter(|t| **t >= window_start).count() as u64,
            ..self.counters
        }
    }
}

/// One async mutex per address is the serialization point for read-modify-write
#[derive(Debug, Default)]
pub struct MemoryReputationStore {
    entries: DashMap<String, Arc<Mutex<AddressLog>>>,
}

impl MemoryReputationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReputationStore for MemoryReputationStore {
    async fn record(
        &self,
        address: &str,
        outcome: &Outcome,
        at: DateTime<Utc>,
        config: &ScoringConfig,
    ) -> Result<ReputationRecord, StorageError> {
        let slot = self.entries.entry(address.to_string()).or_default().clone();
        let mut log = slot.lock().await;

        let window_start = at - config.rate_window();
        log.counters.apply(outcome);
        log.events.push_back(at);
        log.events.retain(|t| *t >= window_start);

        let history = log.history(window_start);
        Ok(ReputationRecord::from_history(address, &history, config, at))
    }

    async fn load(
        &self,
        address: &str,
        window_start: DateTime<Utc>,
    ) -> Result<ReputationHistory, StorageError> {
        let slot = self.entries.get(address).map(|e| e.value().clone());
        match slot {
            Some(slot) => Ok(slot.lock().await.history(window_start)),
            None => Ok(ReputationHistory::default()),
        }
    }

    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StorageError> {
        let slots: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        let mut removed = 0u64;
        for slot in slots {
            let mut log = slot.lock().await;
            let len = log.events.len();
            log.events.retain(|t| *t >= before);
            removed += (len - log.events.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_redeem_is_single_use_under_contention() {
        let store = Arc::new(MemoryNonceStore::new());
        let now = Utc::now();
        store
            .insert(&Nonce {
                value: "contended0000000".to_string(),
                issued_at: now,
                expires_at: now + Duration::minutes(5),
                consumed_at: None,
            })
            .await
            .unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.redeem("contended0000000", now).await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_concurrent_outcomes_are_not_lost() {
        let store = Arc::new(MemoryReputationStore::new());
        let config = ScoringConfig::default();
        let now = Utc::now();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let outcome = if i % 2 == 0 {
                        Outcome::Success { verified_ens: false }
                    } else {
                        Outcome::failure("test")
                    };
                    store.record("0xabc", &outcome, now, &config).await.unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.load("0xabc", now - config.rate_window()).await.unwrap();
        assert_eq!(history.success_count, 25);
        assert_eq!(history.failure_count, 25);
        assert_eq!(history.events_in_window, 50);
    }

    #[tokio::test]
    async fn test_load_does_not_create_entries() {
        let store = MemoryReputationStore::new();
        let history = store.load("0xdef", Utc::now()).await.unwrap();
        assert_eq!(history, ReputationHistory::default());
        assert!(store.entries.is_empty());
    }
}
