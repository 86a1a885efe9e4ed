//! Referral event endpoints
//!
//!   POST /api/referral/event  -> Attribute an event (webhook, shared secret)
//!   GET  /api/referral/event  -> Recent attributed events

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::referral::{DEFAULT_EVENT_PAGE, EventAttribution};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

fn authorize_webhook(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        warn!("Webhook call rejected: WEBHOOK_SECRET is not configured");
        return Err(ApiError::Unauthorized);
    };

    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!("Webhook call rejected: bad or missing secret");
        Err(ApiError::Unauthorized)
    }
}

/// POST /api/referral/event
///
/// The body is only parsed after the secret checks out.
pub async fn post_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    authorize_webhook(&headers, state.webhook_secret.as_deref())?;

    let request: EventAttribution = serde_json::from_slice(&body)
        .map_err(|e| {
            ApiError::bad_request(
                format!("Invalid JSON body: {}", e),
                "Send a JSON object with referralCode and eventType",
            )
        })?;

    let event = state.referrals.attribute_event(request).await?;

    Ok(Json(json!({ "success": true, "eventId": event.id })))
}

/// GET /api/referral/event
pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<EventListQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let events = state
        .referrals
        .recent_events(
            query.limit.unwrap_or(DEFAULT_EVENT_PAGE),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "count": events.len(),
        "events": events,
    })))
}
