use anyhow::{Context, Result};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use siwe_referral::{
    AppState, DatabasePool, IdentityResolver, MiddlewareState, NonceLedger, ReferralLedger,
    ReputationEngine, RpcNameResolver, ServiceConfig, SignatureVerifier, VerificationOrchestrator,
    api::{FailOpenGate, FixedWindowLimiter, RateDecisionGate},
    config::sanitize_for_logging,
    create_router,
    database::{
        NonceStore, ReferralStore, ReputationStore,
        memory::{MemoryNonceStore, MemoryReferralStore, MemoryReputationStore},
    },
};

type Stores = (
    Arc<dyn NonceStore>,
    Arc<dyn ReferralStore>,
    Arc<dyn ReputationStore>,
);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(ServiceConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check environment variables.");
        e
    })?);

    init_logging(&config)?;

    info!("Starting SIWE referral service");
    info!(
        "Origin: {}, nonce TTL: {} min, reverse ENS required: {}",
        config.siwe.origin, config.siwe.nonce_ttl_min, config.ens.require_reverse_ens
    );

    let (nonce_store, referral_store, reputation_store) = open_stores(&config).await?;

    let nonces = Arc::new(NonceLedger::new(nonce_store));
    let referrals = Arc::new(ReferralLedger::new(referral_store));
    let reputation = Arc::new(ReputationEngine::new(
        reputation_store,
        config.reputation.clone(),
    )?);
    info!(
        "Reputation engine initialized: base={}, trusted>={}, probation<{}, blocked at {} failures",
        config.reputation.base,
        config.reputation.trusted_threshold,
        config.reputation.probation_threshold,
        config.reputation.blocked_failure_count
    );

    let name_resolver = RpcNameResolver::new(
        &config.ens.rpc_url,
        &config.ens.registry_address,
        Duration::from_secs(config.ens.resolver_timeout_secs),
    )?;
    let rpc_for_log = if config.logging.sanitize_logs {
        sanitize_for_logging(&config.ens.rpc_url)
    } else {
        config.ens.rpc_url.clone()
    };
    info!(
        "ENS resolver: {} (registry {})",
        rpc_for_log, config.ens.registry_address
    );
    let identity = Arc::new(IdentityResolver::new(Arc::new(name_resolver)));

    let orchestrator = Arc::new(VerificationOrchestrator::new(
        SignatureVerifier::new(config.siwe.origin.clone()),
        nonces.clone(),
        identity.clone(),
        referrals.clone(),
        reputation.clone(),
        config.ens.require_reverse_ens,
    ));

    if config.webhook.secret.is_none() {
        warn!("WEBHOOK_SECRET not set, POST /api/referral/event will reject every call");
    }

    let rate_gate: Option<Arc<dyn RateDecisionGate>> = if config.rate_limit.enabled {
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit.per_minute));
        Some(Arc::new(FailOpenGate::new(limiter)))
    } else {
        info!("Rate limiting disabled");
        None
    };

    spawn_maintenance(
        Duration::from_secs(config.maintenance_interval_secs),
        nonces.clone(),
        reputation.clone(),
        rate_gate.clone(),
    );

    let state = AppState {
        nonces,
        nonce_ttl: config.nonce_ttl(),
        orchestrator,
        identity,
        referrals,
        reputation,
        webhook_secret: config.webhook.secret.clone(),
        require_reverse_ens: config.ens.require_reverse_ens,
    };

    let middleware_state = MiddlewareState {
        rate_gate,
        log_requests: config.logging.log_requests,
        sanitize_logs: config.logging.sanitize_logs,
    };

    let app = create_router(state, middleware_state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("SIWE referral service listening on {}", bind_addr);
    info!(
        "Middleware: Rate limit={}, Request logging={}",
        if config.rate_limit.enabled {
            format!("{}/min", config.rate_limit.per_minute)
        } else {
            "off".to_string()
        },
        config.logging.log_requests
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize logging based on configuration
fn init_logging(config: &ServiceConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with data sanitization enabled");
    }

    Ok(())
}

/// PostgreSQL when DATABASE_URL is set, in-memory stores otherwise
async fn open_stores(config: &ServiceConfig) -> Result<Stores> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("DATABASE_URL not set, using in-memory stores (state is lost on restart)");
        let nonces: Arc<dyn NonceStore> = Arc::new(MemoryNonceStore::new());
        let referrals: Arc<dyn ReferralStore> = Arc::new(MemoryReferralStore::new());
        let reputation: Arc<dyn ReputationStore> = Arc::new(MemoryReputationStore::new());
        return Ok((nonces, referrals, reputation));
    };

    let pool = DatabasePool::new(url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to connect to {}", sanitize_for_logging(url)))?;
    pool.init_schema()
        .await
        .context("Failed to initialize database schema")?;
    info!("Connected to PostgreSQL at {}", sanitize_for_logging(url));

    let nonces: Arc<dyn NonceStore> = pool.nonces();
    let referrals: Arc<dyn ReferralStore> = pool.referrals();
    let reputation: Arc<dyn ReputationStore> = pool.reputation();
    Ok((nonces, referrals, reputation))
}

/// Periodic housekeeping: expired nonces, old reputation events, idle rate windows
fn spawn_maintenance(
    every: Duration,
    nonces: Arc<NonceLedger>,
    reputation: Arc<ReputationEngine>,
    rate_gate: Option<Arc<dyn RateDecisionGate>>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let now = Utc::now();

            match nonces.purge_expired(now).await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired nonces", purged),
                Err(e) => error!("Nonce purge failed: {}", e),
            }

            match reputation.compact(now).await {
                Ok(0) => {}
                Ok(removed) => info!("Compacted {} reputation events", removed),
                Err(e) => error!("Reputation compaction failed: {}", e),
            }

            if let Some(gate) = &rate_gate {
                gate.cleanup();
            }
        }
    });
}
