//! Reputation API Endpoints
//!
//!   GET /api/reputation/score/{address} -> Current score and tier

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::reputation::ReputationRecord;
use crate::siwe::canonical_address;

/// GET /api/reputation/score/{address}
pub async fn get_score(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ReputationRecord>, ApiError> {
    let canonical = canonical_address(&address)
        .ok_or_else(|| ApiError::invalid_address(&address))?;

    let record = state.reputation.get_score(&canonical, Utc::now()).await?;
    Ok(Json(record))
}
