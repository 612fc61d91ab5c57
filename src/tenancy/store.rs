use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::RwLock;

use super::context::{Tenant, TenantId};
use super::error::TenancyError;

/// Lookup of tenants by id. Tenants are administered elsewhere.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, TenancyError>;
}

/// Tenant registry in the `tenants` table of the application database.
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, TenancyError> {
        let query = r#"
            SELECT id, name, slug, is_active
            FROM tenants
            WHERE id = $1
            AND deleted_at IS NULL
        "#;

        let row = sqlx::query(query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up tenant {}: {}", id, e);
                TenancyError::LookupFailure(e.to_string())
            })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tenant = Tenant {
            id: TenantId::new(row.try_get("id").map_err(|e| TenancyError::LookupFailure(e.to_string()))?),
            name: row.try_get("name").map_err(|e| TenancyError::LookupFailure(e.to_string()))?,
            slug: row.try_get("slug").map_err(|e| TenancyError::LookupFailure(e.to_string()))?,
            is_active: row.try_get("is_active").map_err(|e| TenancyError::LookupFailure(e.to_string()))?,
        };
        Ok(Some(tenant))
    }
}

/// In-process tenant registry for tests and local demos.
#[derive(Default)]
pub struct MemoryTenantStore {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let store = Self::new();
        for tenant in tenants {
            store.insert(tenant);
        }
        store
    }

    pub fn insert(&self, tenant: Tenant) {
        let mut tenants = self.tenants.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        tenants.insert(tenant.id, tenant);
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, TenancyError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| TenancyError::LookupFailure("tenant registry lock poisoned".to_string()))?;
        Ok(tenants.get(&id).cloned())
    }
}
