use axum::http::HeaderMap;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::database::{DatabaseError, DatabaseManager};
use crate::tenancy::{
    admit, BindingOptions, BoundSession, PgTenantStore, TenancyError, TenantContext, TenantResolver, TenantSession,
    TenantStore,
};

/// Shared by every request: the pool all tenants share and the pieces of the
/// tenant guard.
///
/// The pool is private. Handlers get tenant data through `ScopedDataAccess`
/// and can only ping the database through [`AppState::health_check`].
#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    tenants: Arc<dyn TenantStore>,
    resolver: Arc<TenantResolver>,
    binding: BindingOptions,
    lookup_timeout: Duration,
}

impl AppState {
    pub fn new(config: &AppConfig, pool: PgPool) -> Self {
        let tenants = Arc::new(PgTenantStore::new(pool.clone()));
        Self::with_store(config, pool, tenants)
    }

    pub fn with_store(config: &AppConfig, pool: PgPool, tenants: Arc<dyn TenantStore>) -> Self {
        Self {
            pool,
            tenants,
            resolver: Arc::new(TenantResolver::from_config(config)),
            binding: BindingOptions::from_config(config),
            lookup_timeout: config.tenancy.lookup_timeout(),
        }
    }

    /// Resolve the tenant named by the request headers and admit it.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<TenantContext, TenancyError> {
        let resolution = self.resolver.resolve(headers)?;
        admit(self.tenants.as_ref(), resolution, self.lookup_timeout).await
    }

    pub async fn bind(&self, ctx: &TenantContext) -> Result<BoundSession, TenancyError> {
        let session = TenantSession::bind(&self.pool, ctx, &self.binding).await?;
        Ok(BoundSession::new(session))
    }

    pub fn query_timeout(&self) -> Duration {
        self.binding.statement_timeout
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}
