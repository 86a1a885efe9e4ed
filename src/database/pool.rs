//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::database::nonces::NonceRepository;
use crate::database::referrals::ReferralRepository;
use crate::database::reputation::ReputationRepository;
use crate::error::StorageError;

pub struct DatabasePool {
    pool: PgPool,
    nonces: Arc<NonceRepository>,
    referrals: Arc<ReferralRepository>,
    reputation: Arc<ReputationRepository>,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await?;

        Ok(Self {
            nonces: Arc::new(NonceRepository::new(pool.clone())),
            referrals: Arc::new(ReferralRepository::new(pool.clone())),
            reputation: Arc::new(ReputationRepository::new(pool.clone())),
            pool,
        })
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        info!("Initializing database schema...");

        self.nonces.init_schema().await?;
        self.referrals.init_schema().await?;
        self.reputation.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn nonces(&self) -> Arc<NonceRepository> {
        self.nonces.clone()
    }

    pub fn referrals(&self) -> Arc<ReferralRepository> {
        self.referrals.clone()
    }

    pub fn reputation(&self) -> Arc<ReputationRepository> {
        self.reputation.clone()
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
