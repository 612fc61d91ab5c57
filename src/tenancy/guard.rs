use std::time::Duration;

use super::context::TenantContext;
use super::error::TenancyError;
use super::resolver::ResolvedTenant;
use super::store::TenantStore;

/// Turn a resolver result into a [`TenantContext`], or reject.
///
/// This is the only constructor of `TenantContext`, so nothing downstream of a
/// rejection can ever hold one.
pub async fn admit(
    store: &dyn TenantStore,
    resolution: Option<ResolvedTenant>,
    lookup_timeout: Duration,
) -> Result<TenantContext, TenancyError> {
    let resolved = resolution.ok_or_else(|| {
        tracing::warn!("Rejecting request: no tenant signal");
        TenancyError::NotResolved
    })?;

    let tenant = tokio::time::timeout(lookup_timeout, store.find_by_id(resolved.id))
        .await
        .map_err(|_| {
            tracing::error!("Tenant lookup for {} timed out after {:?}", resolved.id, lookup_timeout);
            TenancyError::LookupFailure(format!("lookup timed out after {:?}", lookup_timeout))
        })??
        .ok_or_else(|| {
            tracing::warn!("Rejecting request: tenant {} does not exist", resolved.id);
            TenancyError::NotFound(resolved.id.to_string())
        })?;

    if !tenant.is_active {
        tracing::warn!("Rejecting request: tenant {} ({}) is inactive", tenant.slug, tenant.id);
        return Err(TenancyError::Inactive(tenant.id));
    }

    tracing::debug!("Tenant admitted: {} ({}) via {:?}", tenant.slug, tenant.id, resolved.source);
    Ok(TenantContext::new(tenant, resolved.source))
}
