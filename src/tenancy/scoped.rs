use std::marker::PhantomData;
use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::binding::BoundSession;
use super::context::{TenantContext, TenantId};
use super::entity::{EntityKind, ScopedEntity};
use super::error::{DataError, TenancyError};
use super::statement::{self, Statement};
use crate::error::ApiError;
use crate::filter::FilterData;

/// A row of a scoped table, as JSON.
pub type Record = Map<String, Value>;

/// The only path from request code to tenant-owned tables.
///
/// Every call runs on the request's bound connection and is constrained to
/// the context tenant, whatever filter or payload the caller passes.
#[derive(Clone)]
pub struct ScopedDataAccess {
    ctx: TenantContext,
    session: BoundSession,
    query_timeout: Duration,
}

impl ScopedDataAccess {
    pub fn new(ctx: TenantContext, session: BoundSession, query_timeout: Duration) -> Result<Self, TenancyError> {
        if session.tenant_id() != ctx.tenant_id() {
            return Err(TenancyError::Mismatch {
                expected: ctx.tenant_id(),
                found: session.tenant_id().to_string(),
            });
        }
        Ok(Self { ctx, session, query_timeout })
    }

    pub fn context(&self) -> &TenantContext {
        &self.ctx
    }

    pub fn tenant_id(&self) -> TenantId {
        self.ctx.tenant_id()
    }

    pub async fn find_many(&self, kind: EntityKind, filter: FilterData) -> Result<Vec<Record>, DataError> {
        let stmt = statement::select(kind, self.tenant_id(), filter)?;
        self.fetch_records(stmt).await
    }

    pub async fn find_one(&self, kind: EntityKind, mut filter: FilterData) -> Result<Option<Record>, DataError> {
        filter.limit = Some(1);
        filter.offset = None;
        Ok(self.find_many(kind, filter).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<Record>, DataError> {
        self.find_one(kind, FilterData::with_where(by_id(id))).await
    }

    pub async fn count(&self, kind: EntityKind, filter: FilterData) -> Result<i64, DataError> {
        let stmt = statement::count(kind, self.tenant_id(), filter)?;
        let mut session = self.session.lock().await?;
        let conn = session.connection()?;
        let row = tokio::time::timeout(self.query_timeout, stmt.query().fetch_one(conn))
            .await
            .map_err(|_| DataError::Timeout(self.query_timeout))??;
        Ok(row.try_get("count")?)
    }

    pub async fn create(&self, kind: EntityKind, payload: Record) -> Result<Record, DataError> {
        let stmt = statement::insert(kind, self.tenant_id(), payload)?;
        self.fetch_records(stmt)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::InvalidPayload("insert returned no row".to_string()))
    }

    /// `Ok(None)` when no row with that id exists for this tenant.
    pub async fn update_by_id(&self, kind: EntityKind, id: Uuid, patch: Record) -> Result<Option<Record>, DataError> {
        Ok(self.update_many(kind, by_id(id), patch).await?.into_iter().next())
    }

    pub async fn update_many(&self, kind: EntityKind, target: Value, patch: Record) -> Result<Vec<Record>, DataError> {
        let stmt = statement::update(kind, self.tenant_id(), target, patch)?;
        self.fetch_records(stmt).await
    }

    pub async fn delete_by_id(&self, kind: EntityKind, id: Uuid) -> Result<Option<Record>, DataError> {
        Ok(self.delete_many(kind, by_id(id)).await?.into_iter().next())
    }

    pub async fn delete_many(&self, kind: EntityKind, target: Value) -> Result<Vec<Record>, DataError> {
        let stmt = statement::delete(kind, self.tenant_id(), target)?;
        self.fetch_records(stmt).await
    }

    pub fn repository<T: ScopedEntity>(&self) -> Repository<'_, T> {
        Repository { access: self, _marker: PhantomData }
    }

    async fn fetch_records(&self, stmt: Statement) -> Result<Vec<Record>, DataError> {
        let mut session = self.session.lock().await?;
        let conn = session.connection()?;

        tracing::debug!("Scoped query for tenant {}: {}", stmt.tenant, stmt.sql);
        let rows = tokio::time::timeout(self.query_timeout, stmt.query().fetch_all(conn))
            .await
            .map_err(|_| {
                tracing::warn!("Scoped query for tenant {} timed out after {:?}", stmt.tenant, self.query_timeout);
                DataError::Timeout(self.query_timeout)
            })??;

        rows.iter().map(row_to_record).collect()
    }
}

fn by_id(id: Uuid) -> Value {
    json!({ "id": id.to_string() })
}

fn row_to_record(row: &PgRow) -> Result<Record, DataError> {
    match row.try_get::<Value, _>("row")? {
        Value::Object(record) => Ok(record),
        other => Err(DataError::InvalidPayload(format!("expected a row object, got {}", other))),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ScopedDataAccess
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ScopedDataAccess>()
            .cloned()
            .ok_or_else(|| TenancyError::NotResolved.into())
    }
}

/// Typed view over one scoped table.
pub struct Repository<'a, T> {
    access: &'a ScopedDataAccess,
    _marker: PhantomData<T>,
}

impl<'a, T: ScopedEntity> Repository<'a, T> {
    pub async fn find_many(&self, filter: FilterData) -> Result<Vec<T>, DataError> {
        self.access
            .find_many(T::KIND, filter)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<T>, DataError> {
        self.access.find_by_id(T::KIND, id).await?.map(decode).transpose()
    }

    /// Like `find_by_id`, but a missing row is an error.
    pub async fn get(&self, id: Uuid) -> Result<T, DataError> {
        self.find_by_id(id).await?.ok_or(DataError::NotFound)
    }

    pub async fn count(&self, filter: FilterData) -> Result<i64, DataError> {
        self.access.count(T::KIND, filter).await
    }

    pub async fn create(&self, value: &impl Serialize) -> Result<T, DataError> {
        decode(self.access.create(T::KIND, encode(value)?).await?)
    }

    pub async fn update_by_id(&self, id: Uuid, patch: &impl Serialize) -> Result<Option<T>, DataError> {
        self.access
            .update_by_id(T::KIND, id, encode(patch)?)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn delete_by_id(&self, id: Uuid) -> Result<Option<T>, DataError> {
        self.access.delete_by_id(T::KIND, id).await?.map(decode).transpose()
    }
}

fn encode(value: &impl Serialize) -> Result<Record, DataError> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        other => Err(DataError::InvalidPayload(format!("expected an object, got {}", other))),
    }
}

fn decode<T: ScopedEntity>(record: Record) -> Result<T, DataError> {
    Ok(serde_json::from_value(Value::Object(record))?)
}
