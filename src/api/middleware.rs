//! Request middleware
//!
//! Provides:
//! - Per-IP rate decisions ahead of every `/api` handler (fail-open)
//! - Client IP extraction behind reverse proxies
//! - Request logging with sanitization

use async_trait::async_trait;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{FailurePolicy, RATE_GATE_FAILURE_POLICY, StorageError};

/// Counters reported back to the client on admitted requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// `quota` is `None` when the request was let through without being counted
    Allow { quota: Option<Quota> },
    Deny { limit: u32, retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }
}

/// Counting store behind the gate. May fail.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    async fn hit(&self, key: &str) -> Result<Admission, StorageError>;

    /// Drop idle windows
    fn cleanup(&self) {}
}

/// Decides whether a caller may proceed. Never fails.
#[async_trait]
pub trait RateDecisionGate: Send + Sync {
    async fn admit(&self, key: &str) -> Admission;

    fn cleanup(&self) {}
}

/// Fixed-window counter per key, held in memory
#[derive(Debug)]
pub struct FixedWindowLimiter {
    /// Map of key -> (request count, window start)
    requests: DashMap<String, (u32, Instant)>,
    limit: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self::with_window(requests_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            limit,
            window,
        }
    }

    fn check_request(&self, key: &str) -> Admission {
        let now = Instant::now();

        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        let reset_after_secs = self
            .window
            .checked_sub(now.duration_since(*window_start))
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if *count >= self.limit {
            return Admission::Deny {
                limit: self.limit,
                retry_after_secs: reset_after_secs,
            };
        }

        *count += 1;
        Admission::Allow {
            quota: Some(Quota {
                limit: self.limit,
                remaining: self.limit - *count,
                reset_after_secs,
            }),
        }
    }
}

#[async_trait]
impl RateLimitBackend for FixedWindowLimiter {
    async fn hit(&self, key: &str) -> Result<Admission, StorageError> {
        Ok(self.check_request(key))
    }

    fn cleanup(&self) {
        let now = Instant::now();
        self.requests
            .retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }
}

/// Gate that follows `RATE_GATE_FAILURE_POLICY` when its backend is unhealthy
pub struct FailOpenGate {
    backend: Arc<dyn RateLimitBackend>,
}

impl FailOpenGate {
    pub fn new(backend: Arc<dyn RateLimitBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl RateDecisionGate for FailOpenGate {
    async fn admit(&self, key: &str) -> Admission {
        match self.backend.hit(key).await {
            Ok(admission) => admission,
            Err(e) => match RATE_GATE_FAILURE_POLICY {
                FailurePolicy::FailOpen => {
                    error!("Rate limiter unavailable, allowing request: {}", e);
                    Admission::Allow { quota: None }
                }
                FailurePolicy::FailClosed => {
                    error!("Rate limiter unavailable, denying request: {}", e);
                    Admission::Deny {
                        limit: 0,
                        retry_after_secs: 60,
                    }
                }
            },
        }
    }

    fn cleanup(&self) {
        self.backend.cleanup();
    }
}

/// Shared state for middleware
#[derive(Clone)]
pub struct MiddlewareState {
    pub rate_gate: Option<Arc<dyn RateDecisionGate>>,
    pub log_requests: bool,
    pub sanitize_logs: bool,
}

/// Extract client IP from request, handling proxies
pub fn get_client_ip(headers: &HeaderMap, addr: Option<&SocketAddr>) -> String {
    // X-Forwarded-For: first entry is the original client
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next()
    {
        return ip.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(ip) = real_ip.to_str()
    {
        return ip.trim().to_string();
    }

    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP for a request whose connect info may be absent (e.g. in-process tests)
pub fn client_ip_from_parts(parts: &Parts) -> String {
    let addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr);
    get_client_ip(&parts.headers, addr)
}

fn request_client_ip(request: &Request) -> String {
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr);
    get_client_ip(request.headers(), addr)
}

/// Sanitize value for logging (mask sensitive data)
pub fn sanitize_for_log(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

fn insert_quota_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_after: u64) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_after));
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<MiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(gate) = state.rate_gate.as_ref() else {
        return next.run(request).await;
    };

    let client_ip = request_client_ip(&request);
    match gate.admit(&client_ip).await {
        Admission::Deny {
            limit,
            retry_after_secs,
        } => {
            warn!(
                "Rate limit exceeded for IP: {} on path: {}",
                if state.sanitize_logs {
                    sanitize_for_log(&client_ip)
                } else {
                    client_ip.clone()
                },
                request.uri().path()
            );

            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "error": "Too many requests",
                    "suggestion": format!("Retry after {} seconds", retry_after_secs),
                })),
            )
                .into_response();
            let headers = response.headers_mut();
            insert_quota_headers(headers, limit, 0, retry_after_secs);
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
        Admission::Allow { quota } => {
            let mut response = next.run(request).await;
            if let Some(quota) = quota {
                insert_quota_headers(
                    response.headers_mut(),
                    quota.limit,
                    quota.remaining,
                    quota.reset_after_secs,
                );
            } else {
                debug!("Request admitted without rate accounting");
            }
            response
        }
    }
}

/// Request logging middleware with sanitization
pub async fn logging_middleware(
    State(state): State<MiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = request_client_ip(&request);

    let log_ip = if state.sanitize_logs {
        sanitize_for_log(&client_ip)
    } else {
        client_ip
    };

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Request failed"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Client error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            client_ip = %log_ip,
            "Request completed"
        );
    }

    response
}
