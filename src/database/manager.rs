use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::{BindingStrategy, DatabaseConfig};
use crate::tenancy::binding::clear_on_release;

/// Schema for the tenant registry and the scoped tables, with their
/// row-level security policies. Every statement is idempotent.
pub const MIGRATION: &str = include_str!("../../sql/0001_tenancy.sql");

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Migration failed: {0}")]
    MigrationError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds the application pool shared by every tenant.
pub struct DatabaseManager;

impl DatabaseManager {
    pub fn pool_options(config: &DatabaseConfig, strategy: BindingStrategy) -> PgPoolOptions {
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout());

        match strategy {
            // Transaction-local markers end with the transaction
            BindingStrategy::Transaction => options,
            BindingStrategy::Checkout => options.after_release(|conn, _meta| {
                Box::pin(async move {
                    match clear_on_release(conn).await {
                        Ok(keep) => Ok(keep),
                        Err(e) => {
                            tracing::error!("Clearing tenant marker on release failed, closing connection: {}", e);
                            Ok(false)
                        }
                    }
                })
            }),
        }
    }

    pub async fn connect(config: &DatabaseConfig, strategy: BindingStrategy) -> Result<PgPool, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        let pool = Self::pool_options(config, strategy).connect(&config.url).await?;
        info!("Created database pool (max {} connections, {:?} binding)", config.max_connections, strategy);
        Ok(pool)
    }

    /// Pool that opens connections on first use; the server starts even while
    /// the database is still coming up.
    pub fn connect_lazy(config: &DatabaseConfig, strategy: BindingStrategy) -> Result<PgPool, DatabaseError> {
        if config.url.is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        Ok(Self::pool_options(config, strategy).connect_lazy(&config.url)?)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        pool.execute(MIGRATION)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        info!("Applied tenancy schema");
        Ok(())
    }
}
