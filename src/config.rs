//! Service configuration
//!
//! Everything is read from the environment once at startup. Components receive plain values
//! (or a validated `ScoringConfig`) and never read the environment themselves.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use url::Url;

use crate::ens::DEFAULT_ENS_REGISTRY;
use crate::reputation::ScoringConfig;

/// Main service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub siwe: SiweConfig,
    pub ens: EnsConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub webhook: WebhookConfig,
    pub logging: LoggingConfig,
    pub reputation: ScoringConfig,
    /// Seconds between nonce purges / reputation compaction / rate window cleanup
    pub maintenance_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct SiweConfig {
    /// Origin every signed message must name in its URI
    pub origin: String,
    pub nonce_ttl_min: u32,
}

#[derive(Debug, Clone)]
pub struct EnsConfig {
    pub rpc_url: String,
    pub registry_address: String,
    pub resolver_timeout_secs: u64,
    pub require_reverse_ens: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` runs on in-memory stores
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub per_minute: u32,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub log_requests: bool,
    pub sanitize_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl Default for SiweConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            nonce_ttl_min: 5,
        }
    }
}

impl Default for EnsConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            registry_address: DEFAULT_ENS_REGISTRY.to_string(),
            resolver_timeout_secs: 10,
            require_reverse_ens: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_minute: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_requests: true,
            sanitize_logs: true,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            siwe: SiweConfig::default(),
            ens: EnsConfig::default(),
            database: DatabaseConfig::default(),
            rate_limit: RateLimitConfig::default(),
            webhook: WebhookConfig::default(),
            logging: LoggingConfig::default(),
            reputation: ScoringConfig::default(),
            maintenance_interval_secs: 300,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(name) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl ServiceConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Server
        if let Some(host) = lookup("HOST") {
            config.server.host = host;
        }
        parse_var(&lookup, "PORT", &mut config.server.port)?;

        // Sign-in
        if let Some(origin) = lookup("ORIGIN") {
            config.siwe.origin = origin.trim_end_matches('/').to_string();
        }
        parse_var(&lookup, "NONCE_TTL_MIN", &mut config.siwe.nonce_ttl_min)?;

        // ENS
        config.ens.rpc_url = lookup("RPC_URL")
            .filter(|url| !url.trim().is_empty())
            .context("RPC_URL environment variable is required")?;
        if let Some(registry) = lookup("ENS_REGISTRY_ADDRESS") {
            config.ens.registry_address = registry;
        }
        parse_var(&lookup, "RESOLVER_TIMEOUT_SECS", &mut config.ens.resolver_timeout_secs)?;
        parse_var(&lookup, "REQUIRE_REVERSE_ENS", &mut config.ens.require_reverse_ens)?;

        // Database
        config.database.url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", &mut config.database.max_connections)?;

        // Rate limiting
        parse_var(&lookup, "RATE_LIMIT_ENABLED", &mut config.rate_limit.enabled)?;
        parse_var(&lookup, "RATE_LIMIT_PER_MINUTE", &mut config.rate_limit.per_minute)?;

        // Webhook
        config.webhook.secret = lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty());

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }
        parse_var(&lookup, "LOG_REQUESTS", &mut config.logging.log_requests)?;
        parse_var(&lookup, "SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;

        parse_var(&lookup, "MAINTENANCE_INTERVAL_SECS", &mut config.maintenance_interval_secs)?;

        // Reputation scoring
        let rep = &mut config.reputation;
        parse_var(&lookup, "REPUTATION_BASE", &mut rep.base)?;
        parse_var(&lookup, "REPUTATION_ENS_BONUS", &mut rep.ens_bonus)?;
        parse_var(&lookup, "REPUTATION_PER_SUCCESS", &mut rep.per_success)?;
        parse_var(&lookup, "REPUTATION_SUCCESS_CAP", &mut rep.success_cap)?;
        parse_var(&lookup, "REPUTATION_PER_FAILURE", &mut rep.per_failure)?;
        parse_var(&lookup, "REPUTATION_FAILURE_CAP_NEG", &mut rep.failure_cap_neg)?;
        parse_var(&lookup, "REPUTATION_RATE_WINDOW_HOURS", &mut rep.rate_window_hours)?;
        parse_var(&lookup, "REPUTATION_RATE_THRESHOLD", &mut rep.rate_threshold)?;
        parse_var(
            &lookup,
            "REPUTATION_PENALTY_PER_EXCESS_EVENT",
            &mut rep.penalty_per_excess_event,
        )?;
        parse_var(&lookup, "REPUTATION_RATE_PENALTY_MAX", &mut rep.rate_penalty_max)?;
        parse_var(&lookup, "REPUTATION_TRUSTED_THRESHOLD", &mut rep.trusted_threshold)?;
        parse_var(&lookup, "REPUTATION_PROBATION_THRESHOLD", &mut rep.probation_threshold)?;
        parse_var(&lookup, "REPUTATION_BLOCKED_FAILURE_COUNT", &mut rep.blocked_failure_count)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        let origin = Url::parse(&self.siwe.origin)
            .with_context(|| format!("Invalid ORIGIN: {}", self.siwe.origin))?;
        if origin.host_str().is_none() {
            return Err(anyhow::anyhow!("ORIGIN must include a host: {}", self.siwe.origin));
        }
        if self.siwe.nonce_ttl_min == 0 {
            return Err(anyhow::anyhow!("NONCE_TTL_MIN must be at least 1"));
        }

        let rpc = Url::parse(&self.ens.rpc_url).context("Invalid RPC_URL")?;
        if rpc.scheme() != "http" && rpc.scheme() != "https" {
            return Err(anyhow::anyhow!("RPC_URL must be http or https"));
        }
        if self.ens.resolver_timeout_secs == 0 {
            return Err(anyhow::anyhow!("RESOLVER_TIMEOUT_SECS must be at least 1"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("DATABASE_MAX_CONNECTIONS must be at least 1"));
        }

        if self.rate_limit.enabled && self.rate_limit.per_minute == 0 {
            return Err(anyhow::anyhow!(
                "RATE_LIMIT_PER_MINUTE must be at least 1 when rate limiting is enabled"
            ));
        }

        if self.maintenance_interval_secs == 0 {
            return Err(anyhow::anyhow!("MAINTENANCE_INTERVAL_SECS must be at least 1"));
        }

        self.reputation
            .validate()
            .context("Invalid REPUTATION_* configuration")?;

        Ok(())
    }

    pub fn nonce_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.siwe.nonce_ttl_min))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Reduce a connection URL to scheme and host so credentials and API keys stay out of logs
pub fn sanitize_for_logging(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}://{}:{}/***", parsed.scheme(), host, port),
            (Some(host), None) => format!("{}://{}/***", parsed.scheme(), host),
            (None, _) => "***".to_string(),
        },
        Err(_) => "***".to_string(),
    }
}
