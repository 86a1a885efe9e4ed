//! HTTP API
//!
//! Provides REST endpoints for:
//! - SIWE login (nonce issuance, verification, referral binding)
//! - ENS identity queries
//! - Referral event attribution (webhook) and listing
//! - Reputation queries
//! - Rate limiting and request logging middleware

pub mod ens;
pub mod error;
pub mod middleware;
pub mod referral;
pub mod reputation;
pub mod siwe;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::ens::IdentityResolver;
use crate::referral::ReferralLedger;
use crate::reputation::ReputationEngine;
use crate::siwe::NonceLedger;
use crate::verification::VerificationOrchestrator;

pub use error::ApiError;
pub use middleware::{
    Admission, FailOpenGate, FixedWindowLimiter, MiddlewareState, Quota, RateDecisionGate,
    RateLimitBackend, logging_middleware, rate_limit_middleware, sanitize_for_log,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub nonces: Arc<NonceLedger>,
    pub nonce_ttl: chrono::Duration,
    pub orchestrator: Arc<VerificationOrchestrator>,
    pub identity: Arc<IdentityResolver>,
    pub referrals: Arc<ReferralLedger>,
    pub reputation: Arc<ReputationEngine>,
    pub webhook_secret: Option<String>,
    pub require_reverse_ens: bool,
}

/// All `/api` routes behind the rate gate, plus `/health`
pub fn create_router(state: AppState, middleware: MiddlewareState) -> Router {
    let api = Router::new()
        .route("/nonce", get(siwe::get_nonce))
        .route("/verify", post(siwe::verify))
        .route("/ens/info", get(ens::get_ens_info))
        .route(
            "/referral/event",
            post(referral::post_event).get(referral::list_events),
        )
        .route("/reputation/score/{address}", get(reputation::get_score))
        .route_layer(from_fn_with_state(middleware.clone(), rate_limit_middleware))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "OK" }))
        .layer(from_fn_with_state(middleware, logging_middleware))
        .layer(TraceLayer::new_for_http())
}
