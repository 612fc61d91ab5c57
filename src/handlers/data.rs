use axum::{
    extract::{Path, Query},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::{EntityKind, Record, ScopedDataAccess};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    /// e.g. `created_at desc`
    pub order: Option<String>,
}

impl From<ListQuery> for FilterData {
    fn from(query: ListQuery) -> Self {
        FilterData {
            order: query.order.map(Value::String),
            limit: query.limit,
            offset: query.offset,
            ..FilterData::default()
        }
    }
}

pub(crate) fn entity(name: &str) -> Result<EntityKind, ApiError> {
    Ok(name.parse::<EntityKind>()?)
}

fn record_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid record id: {}", raw)))
}

pub(crate) fn object(payload: Value) -> Result<Record, ApiError> {
    match payload {
        Value::Object(record) => Ok(record),
        _ => Err(ApiError::invalid_json("Expected a JSON object")),
    }
}

/// GET /api/data/:entity
pub async fn list(
    Path(name): Path<String>,
    Query(query): Query<ListQuery>,
    data: ScopedDataAccess,
) -> ApiResult<Vec<Record>> {
    let kind = entity(&name)?;
    Ok(ApiResponse::success(data.find_many(kind, query.into()).await?))
}

/// POST /api/data/:entity - one object, or an array of objects
pub async fn create(
    Path(name): Path<String>,
    data: ScopedDataAccess,
    Json(payload): Json<Value>,
) -> ApiResult<Value> {
    let kind = entity(&name)?;

    match payload {
        Value::Array(items) => {
            let mut created = Vec::with_capacity(items.len());
            for item in items {
                created.push(Value::Object(data.create(kind, object(item)?).await?));
            }
            Ok(ApiResponse::created(Value::Array(created)))
        }
        other => {
            let record = data.create(kind, object(other)?).await?;
            Ok(ApiResponse::created(Value::Object(record)))
        }
    }
}

/// GET /api/data/:entity/:id
pub async fn get(
    Path((name, id)): Path<(String, String)>,
    data: ScopedDataAccess,
) -> ApiResult<Record> {
    let kind = entity(&name)?;
    let id = record_id(&id)?;
    let record = data
        .find_by_id(kind, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", kind, id)))?;
    Ok(ApiResponse::success(record))
}

/// PUT|PATCH /api/data/:entity/:id - fields absent from the body are left as they are
pub async fn update(
    Path((name, id)): Path<(String, String)>,
    data: ScopedDataAccess,
    Json(payload): Json<Value>,
) -> ApiResult<Record> {
    let kind = entity(&name)?;
    let id = record_id(&id)?;
    let record = data
        .update_by_id(kind, id, object(payload)?)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", kind, id)))?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/data/:entity/:id
pub async fn delete(
    Path((name, id)): Path<(String, String)>,
    data: ScopedDataAccess,
) -> ApiResult<Record> {
    let kind = entity(&name)?;
    let id = record_id(&id)?;
    let record = data
        .delete_by_id(kind, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", kind, id)))?;
    Ok(ApiResponse::success(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_becomes_filter() {
        let filter: FilterData = ListQuery { limit: Some(10), offset: None, order: Some("nom asc".into()) }.into();
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.order, Some(Value::String("nom asc".into())));
        assert!(filter.where_clause.is_none());
    }

    #[test]
    fn unknown_entity_is_not_found() {
        assert_eq!(entity("tenants").unwrap_err().status_code(), 404);
        assert_eq!(entity("interventions").unwrap(), EntityKind::Intervention);
    }

    #[test]
    fn record_id_must_be_uuid() {
        assert_eq!(record_id("42").unwrap_err().status_code(), 400);
    }
}
