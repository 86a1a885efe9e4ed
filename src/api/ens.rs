//! Identity query endpoint. Read-only.
//!
//!   GET /api/ens/info?ens=<name>        -> forward resolution
//!   GET /api/ens/info?address=<address> -> reverse resolution
//!   GET /api/ens/info                   -> generic metadata

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::AppState;
use crate::api::error::ApiError;
use crate::ens::responses;
use crate::siwe::canonical_address;

#[derive(Debug, Default, Deserialize)]
pub struct EnsInfoQuery {
    pub ens: Option<String>,
    pub address: Option<String>,
}

/// GET /api/ens/info
pub async fn get_ens_info(
    State(state): State<AppState>,
    query: Result<Query<EnsInfoQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let ens = query.ens.filter(|e| !e.trim().is_empty());
    let address = query.address.filter(|a| !a.trim().is_empty());

    if let Some(ens) = ens {
        return match state.identity.resolve_name(&ens).await? {
            Some(resolved) => Ok(Json(responses::ens_resolved(&ens, &resolved))),
            None => Err(ApiError::NotFound(responses::ens_not_resolved(&ens))),
        };
    }

    if let Some(address) = address {
        let canonical = canonical_address(&address)
            .ok_or_else(|| ApiError::invalid_address(&address))?;
        return match state.identity.lookup_address(&canonical).await? {
            Some(name) => Ok(Json(responses::reverse_ens_found(&canonical, &name))),
            None => Err(ApiError::NotFound(responses::reverse_ens_missing(&canonical))),
        };
    }

    Ok(Json(responses::ens_info(None, state.require_reverse_ens)))
}
