//! PostgreSQL connectivity.
//!
//! One [`Database`] handle wraps the sqlx pool for the whole process; the
//! Pg-backed stores clone the pool out of it.

use std::time::Duration;

use ops_core::config::DatabaseConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Shared handle to the Postgres connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool against `config.url`.
    ///
    /// Errors out once the acquire timeout elapses, so server startup can
    /// fall back to in-memory stores instead of hanging.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(&config.url)
            .await?;

        tracing::info!(pool_size = config.pool_size, "Database pool ready");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Drain the pool. Called after the HTTP server has stopped accepting.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool drained");
    }
}
