//! Sign-in endpoints
//!
//!   GET  /api/nonce   -> Issue a login nonce
//!   POST /api/verify  -> Verify a signed SIWE message and bind the referral

use axum::{
    Json,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{header::USER_AGENT, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::convert::Infallible;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::api::middleware::client_ip_from_parts;
use crate::referral::RequestMetadata;
use crate::verification::{LoginRequest, Rejection};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
    pub referral_code: Option<String>,
    pub ens: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMetadata {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestMetadata {
            ip_address: Some(client_ip_from_parts(parts)).filter(|ip| ip != "unknown"),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

/// GET /api/nonce
pub async fn get_nonce(State(state): State<AppState>) -> Result<Json<NonceResponse>, ApiError> {
    let nonce = state.nonces.issue(state.nonce_ttl).await?;
    Ok(Json(NonceResponse {
        nonce: nonce.value,
        expires_at: nonce.expires_at,
    }))
}

/// POST /api/verify
pub async fn verify(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = match body {
        Ok(Json(body)) => body,
        // No JSON body at all reads as an empty one
        Err(JsonRejection::MissingJsonContentType(_)) => {
            return Err(Rejection::MissingFields.into());
        }
        Err(rejection) => {
            return Err(ApiError::bad_request(
                format!("Invalid JSON body: {}", rejection.body_text()),
                "Send a JSON object with string fields message, signature and referralCode",
            ));
        }
    };

    let accepted = state
        .orchestrator
        .verify(LoginRequest {
            message: body.message,
            signature: body.signature,
            referral_code: body.referral_code,
            ens: body.ens,
            metadata,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "referralId": accepted.referral_id,
        "verifiedAt": accepted.verified_at,
    })))
}
