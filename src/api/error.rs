//! HTTP error mapping
//!
//! Rejections become 4xx with their structured body. Store and resolver faults are
//! logged with full context and leave the process as a bare 500 "Server error".

use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use crate::error::{ErrorKind, ResolverError, StorageError};
use crate::referral::AttributionError;
use crate::verification::{Rejection, VerifyError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(Rejection),

    #[error("bad request: {error}")]
    BadRequest {
        error: String,
        suggestion: &'static str,
    },

    #[error("unauthorized")]
    Unauthorized,

    /// Body is returned verbatim
    #[error("not found")]
    NotFound(Value),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>, suggestion: &'static str) -> Self {
        ApiError::BadRequest {
            error: error.into(),
            suggestion,
        }
    }

    pub fn invalid_address(address: &str) -> Self {
        Self::bad_request(
            format!("Invalid address: {}", address),
            "Pass a 0x-prefixed 20-byte hex address",
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Rejected(rejection) => rejection.kind(),
            ApiError::BadRequest { .. } | ApiError::NotFound(_) => ErrorKind::ClientInput,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::Storage(_) | ApiError::Resolver(_) => ErrorKind::InfrastructureFault,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(_) | ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Rejected(rejection) => rejection.body(),
            ApiError::BadRequest { error, suggestion } => {
                json!({ "success": false, "error": error, "suggestion": suggestion })
            }
            ApiError::Unauthorized => json!({ "success": false, "error": "Unauthorized" }),
            ApiError::NotFound(body) => body,
            ApiError::Storage(e) => {
                error!(kind = ?ErrorKind::InfrastructureFault, "Storage failure: {}", e);
                json!({ "success": false, "error": "Server error" })
            }
            ApiError::Resolver(e) => {
                error!(kind = ?ErrorKind::InfrastructureFault, "Resolver failure: {}", e);
                json!({ "success": false, "error": "Server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Rejected(rejection) => ApiError::Rejected(rejection),
            VerifyError::Storage(e) => ApiError::Storage(e),
            VerifyError::Resolver(e) => ApiError::Resolver(e),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(
            format!("Invalid query string: {}", rejection.body_text()),
            "Check the query parameter names and value types",
        )
    }
}

impl From<AttributionError> for ApiError {
    fn from(err: AttributionError) -> Self {
        match err {
            AttributionError::MissingFields => ApiError::bad_request(
                "Missing referralCode or eventType",
                "Include referralCode and eventType in the request body",
            ),
            AttributionError::ReferralNotFound(_) => {
                ApiError::NotFound(json!({ "success": false, "error": "Referral not found" }))
            }
            AttributionError::Storage(e) => ApiError::Storage(e),
        }
    }
}
