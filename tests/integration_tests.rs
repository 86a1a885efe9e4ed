//! Integration tests for the SIWE referral service
//!
//! These tests drive the login pipeline, referral attribution, reputation scoring and the
//! HTTP router end to end on in-memory stores and a scripted name resolver.

use alloy_primitives::eip191_hash_message;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use k256::ecdsa::SigningKey;
use siwe_referral::database::memory::{
    MemoryNonceStore, MemoryReferralStore, MemoryReputationStore,
};
use siwe_referral::siwe::{SiweMessage, address_from_key, normalize_address};
use siwe_referral::{
    AppState, IdentityResolver, LoginAccepted, LoginRequest, MiddlewareState, NameResolver,
    NonceLedger, ReferralLedger, Rejection, RequestMetadata, ReputationEngine, ResolverError,
    ScoringConfig, SignatureVerifier, VerificationOrchestrator, VerifyError,
};
use std::collections::HashMap;
use std::sync::Arc;

const ORIGIN: &str = "https://app.example.com";

// ============================================================================
// Test Helpers
// ============================================================================

/// Name resolver answering from fixed tables
#[derive(Default)]
struct ScriptedResolver {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
    reverse_down: bool,
}

impl ScriptedResolver {
    fn with_name(mut self, name: &str, address: &str) -> Self {
        self.forward.insert(name.to_string(), address.to_string());
        self
    }

    fn with_reverse(mut self, address: &str, name: &str) -> Self {
        self.reverse.insert(address.to_string(), name.to_string());
        self
    }
}

#[async_trait]
impl NameResolver for ScriptedResolver {
    async fn resolve_name(&self, name: &str) -> Result<Option<String>, ResolverError> {
        Ok(self.forward.get(name).cloned())
    }

    async fn lookup_address(&self, address: &str) -> Result<Option<String>, ResolverError> {
        if self.reverse_down {
            return Err(ResolverError::Unavailable("connection refused".to_string()));
        }
        Ok(self.reverse.get(address).cloned())
    }
}

/// Fully wired service on in-memory stores
struct Service {
    nonces: Arc<NonceLedger>,
    referrals: Arc<ReferralLedger>,
    reputation: Arc<ReputationEngine>,
    identity: Arc<IdentityResolver>,
    orchestrator: Arc<VerificationOrchestrator>,
    require_reverse_ens: bool,
}

fn service(resolver: ScriptedResolver, require_reverse_ens: bool) -> Service {
    service_with_config(resolver, require_reverse_ens, ScoringConfig::default())
}

fn service_with_config(
    resolver: ScriptedResolver,
    require_reverse_ens: bool,
    config: ScoringConfig,
) -> Service {
    let nonces = Arc::new(NonceLedger::new(Arc::new(MemoryNonceStore::new())));
    let referrals = Arc::new(ReferralLedger::new(Arc::new(MemoryReferralStore::new())));
    let reputation = Arc::new(
        ReputationEngine::new(Arc::new(MemoryReputationStore::new()), config).unwrap(),
    );
    let identity = Arc::new(IdentityResolver::new(Arc::new(resolver)));
    let orchestrator = Arc::new(VerificationOrchestrator::new(
        SignatureVerifier::new(ORIGIN),
        nonces.clone(),
        identity.clone(),
        referrals.clone(),
        reputation.clone(),
        require_reverse_ens,
    ));

    Service {
        nonces,
        referrals,
        reputation,
        identity,
        orchestrator,
        require_reverse_ens,
    }
}

impl Service {
    fn app_state(&self, webhook_secret: Option<&str>) -> AppState {
        AppState {
            nonces: self.nonces.clone(),
            nonce_ttl: Duration::minutes(10),
            orchestrator: self.orchestrator.clone(),
            identity: self.identity.clone(),
            referrals: self.referrals.clone(),
            reputation: self.reputation.clone(),
            webhook_secret: webhook_secret.map(str::to_string),
            require_reverse_ens: self.require_reverse_ens,
        }
    }

    async fn fresh_nonce(&self) -> String {
        self.nonces.issue(Duration::minutes(5)).await.unwrap().value
    }
}

fn key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed; 32]).unwrap()
}

fn address_of(key: &SigningKey) -> String {
    normalize_address(&address_from_key(key.verifying_key()))
}

/// Build and sign a login message; returns (message, signature)
fn sign_login(key: &SigningKey, nonce: &str) -> (String, String) {
    let now = Utc::now();
    let message = SiweMessage {
        domain: "app.example.com".to_string(),
        address: address_from_key(key.verifying_key()),
        statement: Some("Sign in to the referral program".to_string()),
        uri: ORIGIN.to_string(),
        version: "1".to_string(),
        chain_id: 1,
        nonce: nonce.to_string(),
        issued_at: now,
        expiration_time: Some(now + Duration::minutes(10)),
        not_before: None,
        request_id: None,
        resources: vec![],
    }
    .to_string();

    let (sig, recid) = key
        .sign_prehash_recoverable(eip191_hash_message(&message).as_slice())
        .unwrap();
    let mut bytes = sig.to_bytes().to_vec();
    bytes.push(27 + recid.to_byte());

    (message, format!("0x{}", hex::encode(bytes)))
}

fn login(key: &SigningKey, nonce: &str, referral_code: &str, ens: Option<&str>) -> LoginRequest {
    let (message, signature) = sign_login(key, nonce);
    LoginRequest {
        message: Some(message),
        signature: Some(signature),
        referral_code: Some(referral_code.to_string()),
        ens: ens.map(str::to_string),
        metadata: RequestMetadata::default(),
    }
}

fn rejection(result: Result<LoginAccepted, VerifyError>) -> Rejection {
    match result {
        Err(VerifyError::Rejected(r)) => r,
        other => panic!("expected rejection, got {:?}", other),
    }
}

// ============================================================================
// Login Flow
// ============================================================================

mod login_flow {
    use super::*;
    use siwe_referral::ens::IdentityRejection;
    use siwe_referral::siwe::NonceStatus;

    #[tokio::test]
    async fn test_login_then_replay_reports_nonce_already_used() {
        let svc = service(ScriptedResolver::default(), false);
        let signer = key(7);
        let nonce = svc.fresh_nonce().await;
        let request = login(&signer, &nonce, "ALPHA", None);

        let accepted = svc.orchestrator.verify(request.clone()).await.unwrap();
        assert_eq!(accepted.address, address_of(&signer));

        let replay = rejection(svc.orchestrator.verify(request).await);
        assert_eq!(replay, Rejection::NonceAlreadyUsed);
        assert_eq!(replay.body()["error"], "Nonce already used");

        assert_eq!(
            svc.nonces.check(&nonce, Utc::now()).await.unwrap(),
            NonceStatus::Consumed
        );
    }

    #[tokio::test]
    async fn test_ens_claim_resolving_elsewhere_is_rejected() {
        let other = address_of(&key(9));
        let svc = service(ScriptedResolver::default().with_name("alice.eth", &other), false);
        let signer = key(8);
        let nonce = svc.fresh_nonce().await;

        let rejected = rejection(
            svc.orchestrator
                .verify(login(&signer, &nonce, "ALPHA", Some("alice.eth")))
                .await,
        );

        let body = rejected.body();
        assert_eq!(body["expectedAddress"], address_of(&signer));
        assert_eq!(body["resolvedAddress"], other);
        assert_eq!(body["error"], "ENS does not resolve to signer address");

        // The rejected attempt did not burn the nonce
        assert_eq!(
            svc.nonces.check(&nonce, Utc::now()).await.unwrap(),
            NonceStatus::Valid
        );
    }

    #[tokio::test]
    async fn test_ens_claim_matching_signer_is_bound() {
        let signer = key(10);
        let svc = service(
            ScriptedResolver::default().with_name("bob.eth", &address_of(&signer)),
            false,
        );
        let nonce = svc.fresh_nonce().await;

        svc.orchestrator
            .verify(login(&signer, &nonce, "BETA", Some("bob.eth")))
            .await
            .unwrap();

        let record = svc
            .reputation
            .get_score(&address_of(&signer), Utc::now())
            .await
            .unwrap();
        assert!(record.has_verified_ens);
        assert_eq!(record.success_count, 1);
    }

    #[tokio::test]
    async fn test_required_reverse_record_missing() {
        let signer = key(11);
        let svc = service(
            ScriptedResolver::default().with_name("carol.eth", &address_of(&signer)),
            true,
        );
        let nonce = svc.fresh_nonce().await;

        // Forward claim checks out, reverse is still required
        let rejected = rejection(
            svc.orchestrator
                .verify(login(&signer, &nonce, "GAMMA", Some("carol.eth")))
                .await,
        );
        assert!(matches!(
            rejected,
            Rejection::Identity(IdentityRejection::ReverseMissing { .. })
        ));
        assert_eq!(
            rejected.body()["error"],
            "Reverse ENS lookup returned no name for address"
        );
    }

    #[tokio::test]
    async fn test_required_reverse_with_resolver_down_is_rejected() {
        let signer = key(12);
        let resolver = ScriptedResolver {
            reverse_down: true,
            ..Default::default()
        };
        let svc = service(resolver, true);
        let nonce = svc.fresh_nonce().await;

        let rejected = rejection(
            svc.orchestrator
                .verify(login(&signer, &nonce, "DELTA", None))
                .await,
        );
        assert!(matches!(
            rejected,
            Rejection::Identity(IdentityRejection::ReverseMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_reverse_name_must_match_claim() {
        let signer = key(13);
        let address = address_of(&signer);
        let svc = service(
            ScriptedResolver::default()
                .with_name("dave.eth", &address)
                .with_reverse(&address, "mallory.eth"),
            true,
        );
        let nonce = svc.fresh_nonce().await;

        let rejected = rejection(
            svc.orchestrator
                .verify(login(&signer, &nonce, "EPS", Some("dave.eth")))
                .await,
        );
        let body = rejected.body();
        assert_eq!(body["expectedEns"], "dave.eth");
        assert_eq!(body["reverseEns"], "mallory.eth");
    }

    #[tokio::test]
    async fn test_message_for_other_origin_is_rejected() {
        let svc = service(ScriptedResolver::default(), false);
        let signer = key(14);
        let nonce = svc.fresh_nonce().await;

        let verifier = VerificationOrchestrator::new(
            SignatureVerifier::new("https://other.example.com"),
            svc.nonces.clone(),
            svc.identity.clone(),
            svc.referrals.clone(),
            svc.reputation.clone(),
            false,
        );

        let rejected = rejection(verifier.verify(login(&signer, &nonce, "ZETA", None)).await);
        assert!(matches!(rejected, Rejection::OriginMismatch { .. }));
    }
}

// ============================================================================
// Nonce Concurrency
// ============================================================================

mod nonce_concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_logins_accept_once() {
        let svc = service(ScriptedResolver::default(), false);
        let signer = key(21);
        let nonce = svc.fresh_nonce().await;
        let request = login(&signer, &nonce, "RACE", None);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let orchestrator = svc.orchestrator.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move { orchestrator.verify(request).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(VerifyError::Rejected(Rejection::NonceAlreadyUsed)) => {}
                Err(other) => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_single_winner() {
        use siwe_referral::siwe::ConsumeResult;

        let svc = service(ScriptedResolver::default(), false);
        let nonce = svc.fresh_nonce().await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let nonces = svc.nonces.clone();
            let nonce = nonce.clone();
            handles.push(tokio::spawn(async move {
                nonces.consume(&nonce, Utc::now()).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), ConsumeResult::Ok(_)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}

// ============================================================================
// Reputation
// ============================================================================

mod reputation {
    use super::*;
    use siwe_referral::{Outcome, ReputationStatus};

    #[tokio::test]
    async fn test_failures_block_despite_high_score() {
        let config = ScoringConfig {
            trusted_threshold: 70,
            ..ScoringConfig::default()
        };
        let svc = service_with_config(ScriptedResolver::default(), false, config);
        let address = address_of(&key(31));
        let now = Utc::now();

        for _ in 0..5 {
            svc.reputation
                .record_outcome(&address, Outcome::Success { verified_ens: true }, now)
                .await
                .unwrap();
        }
        let before = svc.reputation.get_score(&address, now).await.unwrap();
        assert_eq!(before.status, ReputationStatus::Trusted);

        for _ in 0..7 {
            svc.reputation
                .record_outcome(&address, Outcome::failure("signature_invalid"), now)
                .await
                .unwrap();
        }

        let record = svc.reputation.get_score(&address, now).await.unwrap();
        assert_eq!(record.failure_count, 7);
        // 50 + 20 + 10 - 6: still above the trusted line
        assert_eq!(record.score, 74);
        assert_eq!(record.status, ReputationStatus::Blocked);
    }

    #[tokio::test]
    async fn test_unknown_address_has_base_score() {
        let svc = service(ScriptedResolver::default(), false);
        let record = svc
            .reputation
            .get_score(&address_of(&key(32)), Utc::now())
            .await
            .unwrap();

        assert_eq!(record.score, 50);
        assert_eq!(record.success_count, 0);
        assert_eq!(record.status, ReputationStatus::Active);
    }

    #[tokio::test]
    async fn test_signer_attributed_rejections_count_as_failures() {
        let svc = service(ScriptedResolver::default(), false);
        let signer = key(33);

        // A nonce that was never issued
        let rejected = rejection(
            svc.orchestrator
                .verify(login(&signer, "neverissued0001", "ETA", None))
                .await,
        );
        assert_eq!(rejected, Rejection::NonceMissing);

        let record = svc
            .reputation
            .get_score(&address_of(&signer), Utc::now())
            .await
            .unwrap();
        assert_eq!(record.failure_count, 1);
        assert_eq!(record.score, 45);
    }
}

// ============================================================================
// Referral Attribution
// ============================================================================

mod referral_attribution {
    use super::*;
    use siwe_referral::referral::{AttributionError, EventAttribution};

    #[tokio::test]
    async fn test_event_attributed_to_bound_referral() {
        let signer = key(41);
        let svc = service(
            ScriptedResolver::default().with_name("erin.eth", &address_of(&signer)),
            false,
        );
        let nonce = svc.fresh_nonce().await;
        let accepted = svc
            .orchestrator
            .verify(login(&signer, &nonce, "ERIN-1", Some("erin.eth")))
            .await
            .unwrap();

        let event = svc
            .referrals
            .attribute_event(EventAttribution {
                user_id: Some("user-17".to_string()),
                referral_code: Some("ERIN-1".to_string()),
                event_type: Some("purchase".to_string()),
                event_payload: Some(serde_json::json!({ "sku": "plan-pro" })),
                amount: Some(49.0),
            })
            .await
            .unwrap();
        assert_eq!(event.referral_id, accepted.referral_id);

        let events = svc.referrals.recent_events(10, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].referral_code, "ERIN-1");
        assert_eq!(events[0].referrer_ens.as_deref(), Some("erin.eth"));
        assert_eq!(events[0].referrer_address, address_of(&signer));
        assert_eq!(events[0].amount, Some(49.0));
    }

    #[tokio::test]
    async fn test_unknown_code_and_missing_fields() {
        let svc = service(ScriptedResolver::default(), false);

        let err = svc
            .referrals
            .attribute_event(EventAttribution {
                referral_code: Some("NOPE".to_string()),
                event_type: Some("signup".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AttributionError::ReferralNotFound(_)));

        let err = svc
            .referrals
            .attribute_event(EventAttribution {
                referral_code: Some("NOPE".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AttributionError::MissingFields));
    }
}

// ============================================================================
// HTTP API
// ============================================================================

mod http_api {
    use super::*;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
    use serde_json::{Value, json};
    use siwe_referral::api::{FailOpenGate, FixedWindowLimiter};
    use siwe_referral::create_router;
    use tower::ServiceExt;

    fn router(svc: &Service, webhook_secret: Option<&str>) -> Router {
        create_router(
            svc.app_state(webhook_secret),
            MiddlewareState {
                rate_gate: None,
                log_requests: false,
                sanitize_logs: true,
            },
        )
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let svc = service(ScriptedResolver::default(), false);
        let response = router(&svc, None).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nonce_then_verify_then_replay() {
        let svc = service(ScriptedResolver::default(), false);
        let app = router(&svc, None);

        let (status, body) = send(app.clone(), get("/api/nonce")).await;
        assert_eq!(status, StatusCode::OK);
        let nonce = body["nonce"].as_str().unwrap().to_string();
        assert!(body["expiresAt"].is_string());

        let (message, signature) = sign_login(&key(51), &nonce);
        let payload = json!({
            "message": message,
            "signature": signature,
            "referralCode": "HTTP-1",
        });

        let (status, body) = send(app.clone(), post_json("/api/verify", &payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["referralId"].is_string());
        assert!(body["verifiedAt"].is_string());

        let (status, body) = send(app, post_json("/api/verify", &payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Nonce already used");
    }

    #[tokio::test]
    async fn test_verify_missing_fields() {
        let svc = service(ScriptedResolver::default(), false);
        let (status, body) = send(
            router(&svc, None),
            post_json("/api/verify", &json!({ "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_verify_unreadable_bodies_are_json_errors() {
        let svc = service(ScriptedResolver::default(), false);
        let app = router(&svc, None);
        let raw = |content_type: Option<&str>, body: &'static str| {
            let mut builder = Request::builder().method("POST").uri("/api/verify");
            if let Some(content_type) = content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder.body(Body::from(body)).unwrap()
        };

        // No content type reads as an empty body
        let (status, body) = send(app.clone(), raw(None, "")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
        assert!(body["suggestion"].is_string());

        let (status, body) = send(app.clone(), raw(Some("application/json"), "{ not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["suggestion"].is_string());

        let (status, body) = send(
            app,
            post_json("/api/verify", &json!({ "message": 7, "signature": [], "referralCode": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["suggestion"].is_string());
    }

    #[tokio::test]
    async fn test_bad_query_strings_are_json_errors() {
        let svc = service(ScriptedResolver::default(), false);
        let app = router(&svc, None);

        let (status, body) = send(app.clone(), get("/api/referral/event?limit=abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["suggestion"].is_string());

        let (status, body) = send(app, get("/api/ens/info?address=0x12")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid address: 0x12");
        assert!(body["suggestion"].is_string());
    }

    #[tokio::test]
    async fn test_webhook_rejected_before_body_is_read() {
        let svc = service(ScriptedResolver::default(), false);
        let request = Request::builder()
            .method("POST")
            .uri("/api/referral/event")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap();

        let (status, body) = send(router(&svc, Some("s3cret")), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_webhook_unknown_referral_code() {
        let svc = service(ScriptedResolver::default(), false);
        let request = Request::builder()
            .method("POST")
            .uri("/api/referral/event")
            .header(CONTENT_TYPE, "application/json")
            .header("x-webhook-secret", "s3cret")
            .body(Body::from(
                json!({ "referralCode": "GHOST", "eventType": "signup" }).to_string(),
            ))
            .unwrap();

        let (status, body) = send(router(&svc, Some("s3cret")), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Referral not found");
    }

    #[tokio::test]
    async fn test_webhook_event_listed() {
        let svc = service(ScriptedResolver::default(), false);
        let nonce = svc.fresh_nonce().await;
        svc.orchestrator
            .verify(login(&key(52), &nonce, "LIST-1", None))
            .await
            .unwrap();
        let app = router(&svc, Some("s3cret"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/referral/event")
            .header(CONTENT_TYPE, "application/json")
            .header("x-webhook-secret", "s3cret")
            .body(Body::from(
                json!({ "referralCode": "LIST-1", "eventType": "signup", "userId": "u-1" })
                    .to_string(),
            ))
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["eventId"].is_string());

        let (status, body) = send(app, get("/api/referral/event?limit=500")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["events"][0]["referralCode"], "LIST-1");
        assert_eq!(body["events"][0]["eventType"], "signup");
    }

    #[tokio::test]
    async fn test_reputation_score_endpoint() {
        let svc = service(ScriptedResolver::default(), false);
        let app = router(&svc, None);
        let address = address_of(&key(53));

        let (status, body) = send(
            app.clone(),
            get(&format!("/api/reputation/score/{}", address.to_uppercase().replacen("0X", "0x", 1))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], address);
        assert_eq!(body["score"], 50);
        assert_eq!(body["status"], "active");

        let (status, _) = send(app, get("/api/reputation/score/not-an-address")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ens_info_endpoint() {
        let address = address_of(&key(54));
        let svc = service(
            ScriptedResolver::default()
                .with_name("frank.eth", &address)
                .with_reverse(&address, "frank.eth"),
            true,
        );
        let app = router(&svc, None);

        let (status, body) = send(app.clone(), get("/api/ens/info?ens=frank.eth")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], address);
        assert_eq!(body["ensUrl"], "https://app.ens.domains/frank.eth");

        let (status, body) = send(app.clone(), get("/api/ens/info?ens=nobody.eth")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "ENS name does not resolve");

        let (status, body) =
            send(app.clone(), get(&format!("/api/ens/info?address={}", address))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ens"], "frank.eth");

        let (status, body) = send(app, get("/api/ens/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reverseResolutionRequired"], true);
    }

    #[tokio::test]
    async fn test_rate_gate_returns_429() {
        let svc = service(ScriptedResolver::default(), false);
        let limiter = Arc::new(FixedWindowLimiter::new(2));
        let app = create_router(
            svc.app_state(None),
            MiddlewareState {
                rate_gate: Some(Arc::new(FailOpenGate::new(limiter))),
                log_requests: false,
                sanitize_logs: true,
            },
        );

        let request = || {
            Request::builder()
                .uri("/api/nonce")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-ratelimit-remaining"));
        }

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));

        // Health sits outside the gate
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
