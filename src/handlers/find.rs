use axum::{extract::Path, Json};
use serde_json::Value;

use super::data::entity;
use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{Record, ScopedDataAccess};

/// POST /api/find/:entity - filtered find
pub async fn find(
    Path(name): Path<String>,
    data: ScopedDataAccess,
    Json(filter): Json<FilterData>,
) -> ApiResult<Vec<Record>> {
    let kind = entity(&name)?;
    Ok(ApiResponse::success(data.find_many(kind, filter).await?))
}

/// DELETE /api/find/:entity - delete everything the `where` document matches
pub async fn delete(
    Path(name): Path<String>,
    data: ScopedDataAccess,
    Json(filter): Json<FilterData>,
) -> ApiResult<Vec<Record>> {
    let kind = entity(&name)?;
    let target = match filter.where_clause {
        Some(Value::Object(conditions)) if !conditions.is_empty() => Value::Object(conditions),
        _ => return Err(ApiError::bad_request("Bulk delete requires a non-empty where document")),
    };
    Ok(ApiResponse::success(data.delete_many(kind, target).await?))
}
