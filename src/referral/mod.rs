//! Referral bindings and attributed events
//!
//! A binding is written once per successful login and never updated. Events reference
//! the latest binding for a referral code and are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::ReferralStore;
use crate::error::StorageError;

/// Where a login request came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReferralBinding {
    pub referral_code: String,
    pub referrer_address: String,
    pub referrer_ens: Option<String>,
    pub signature: String,
    pub raw_message: String,
    pub nonce: String,
    pub metadata: RequestMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralBinding {
    pub id: Uuid,
    pub referral_code: String,
    pub referrer_address: String,
    pub referrer_ens: Option<String>,
    pub signature: String,
    pub raw_message: String,
    pub nonce: String,
    pub metadata: RequestMetadata,
    pub created_at: DateTime<Utc>,
}

impl ReferralBinding {
    pub fn from_new(new: NewReferralBinding, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            referral_code: new.referral_code,
            referrer_address: new.referrer_address,
            referrer_ens: new.referrer_ens,
            signature: new.signature,
            raw_message: new.raw_message,
            nonce: new.nonce,
            metadata: new.metadata,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAttributedEvent {
    pub referral_id: Uuid,
    pub user_id: Option<String>,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributedEvent {
    pub id: Uuid,
    pub referral_id: Uuid,
    pub user_id: Option<String>,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl AttributedEvent {
    pub fn from_new(new: NewAttributedEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            referral_id: new.referral_id,
            user_id: new.user_id,
            event_type: new.event_type,
            payload: new.payload,
            amount: new.amount,
            created_at,
        }
    }
}

/// An event joined with the binding it is attributed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub id: Uuid,
    pub event_type: String,
    pub event_payload: Option<serde_json::Value>,
    pub amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub referral_code: String,
    pub referrer_ens: Option<String>,
    pub referrer_address: String,
}

/// Webhook payload for attributing an event to a referral code
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAttribution {
    pub user_id: Option<String>,
    pub referral_code: Option<String>,
    pub event_type: Option<String>,
    pub event_payload: Option<serde_json::Value>,
    pub amount: Option<f64>,
}

#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("missing referralCode or eventType")]
    MissingFields,

    #[error("referral not found: {0}")]
    ReferralNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Default and ceiling page sizes for event listings
pub const DEFAULT_EVENT_PAGE: u32 = 50;
pub const MAX_EVENT_PAGE: u32 = 100;

pub struct ReferralLedger {
    store: Arc<dyn ReferralStore>,
}

impl ReferralLedger {
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self { store }
    }

    pub async fn bind(&self, binding: NewReferralBinding) -> Result<ReferralBinding, StorageError> {
        let stored = self.store.insert_binding(binding).await?;
        info!(
            referral_id = %stored.id,
            referral_code = %stored.referral_code,
            address = %stored.referrer_address,
            "Referral bound"
        );
        Ok(stored)
    }

    /// Attribute an event to the most recent binding of its referral code.
    ///
    /// Callers authenticate the webhook before calling this.
    pub async fn attribute_event(
        &self,
        request: EventAttribution,
    ) -> Result<AttributedEvent, AttributionError> {
        let referral_code = request
            .referral_code
            .filter(|c| !c.is_empty())
            .ok_or(AttributionError::MissingFields)?;
        let event_type = request
            .event_type
            .filter(|t| !t.is_empty())
            .ok_or(AttributionError::MissingFields)?;

        let binding = self
            .store
            .latest_binding(&referral_code)
            .await?
            .ok_or_else(|| AttributionError::ReferralNotFound(referral_code.clone()))?;

        let event = self
            .store
            .insert_event(NewAttributedEvent {
                referral_id: binding.id,
                user_id: request.user_id,
                event_type,
                payload: request.event_payload,
                amount: request.amount,
            })
            .await?;

        debug!(
            event_id = %event.id,
            referral_id = %binding.id,
            event_type = %event.event_type,
            "Attributed referral event"
        );
        Ok(event)
    }

    /// Most recent events first; `limit` is clamped to `MAX_EVENT_PAGE`
    pub async fn recent_events(&self, limit: u32, offset: u32) -> Result<Vec<EventView>, StorageError> {
        self.store
            .recent_events(limit.clamp(1, MAX_EVENT_PAGE), offset)
            .await
    }
}
