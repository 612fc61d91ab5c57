use serde::Serialize;

use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{TenantContext, TenantId, TenantSource};

#[derive(Debug, Serialize)]
pub struct CurrentTenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
    pub source: TenantSource,
}

/// GET /api/tenant - the tenant this request was admitted for
pub async fn current(ctx: TenantContext) -> ApiResult<CurrentTenant> {
    let tenant = ctx.tenant();
    Ok(ApiResponse::success(CurrentTenant {
        id: tenant.id,
        name: tenant.name.clone(),
        slug: tenant.slug.clone(),
        source: ctx.source(),
    }))
}
