//! SQL generation for scoped data access.
//!
//! Every statement built here binds the context tenant as `$1` and carries
//! `"tenant_id" = $1` as a top-level conjunct of its target filter. Caller
//! filters and payloads can narrow further but never widen.

use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::{Postgres, query::Query};

use super::context::TenantId;
use super::entity::{EntityKind, TENANT_COLUMN, TENANT_FIELD_ALIAS};
use super::error::{DataError, TenancyError};
use crate::filter::{validate_column, Filter, FilterData};

/// Columns maintained by the database. Primary keys are unique across
/// tenants, so a caller-chosen `id` would reveal whether another tenant uses it.
const SYSTEM_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub tenant: TenantId,
    /// Bound as JSONB `$2`, `$3`, ... after the tenant.
    pub params: Vec<Value>,
}

impl Statement {
    pub fn query(&self) -> Query<'_, Postgres, PgArguments> {
        let mut q = sqlx::query(&self.sql).bind(self.tenant.as_uuid());
        for p in &self.params {
            q = q.bind(p.clone());
        }
        q
    }
}

pub fn select(kind: EntityKind, tenant: TenantId, filter_data: FilterData) -> Result<Statement, DataError> {
    let filter = scoped_filter(filter_data, tenant)?;
    let compiled = filter.compile_for(kind.table(), 1)?;

    let inner = [
        format!("SELECT {} FROM \"{}\"", compiled.select, kind.table()),
        format!("WHERE \"{}\" = $1 AND ({})", TENANT_COLUMN, compiled.where_clause),
        compiled.order,
        compiled.limit,
    ]
    .into_iter()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    Ok(Statement {
        sql: format!("SELECT row_to_json(t) AS row FROM ({}) t", inner),
        tenant,
        params: compiled.params,
    })
}

pub fn count(kind: EntityKind, tenant: TenantId, filter_data: FilterData) -> Result<Statement, DataError> {
    let filter = scoped_filter(filter_data, tenant)?;
    let compiled = filter.compile_for(kind.table(), 1)?;

    Ok(Statement {
        sql: format!(
            "SELECT COUNT(*) AS count FROM \"{}\" WHERE \"{}\" = $1 AND ({})",
            kind.table(),
            TENANT_COLUMN,
            compiled.where_clause
        ),
        tenant,
        params: compiled.params,
    })
}

pub fn insert(kind: EntityKind, tenant: TenantId, payload: Map<String, Value>) -> Result<Statement, DataError> {
    let record = prepare_insert(payload, tenant)?;
    let table = kind.table();

    let columns: Vec<&String> = record.keys().collect();
    let column_list = std::iter::once(format!("\"{}\"", TENANT_COLUMN))
        .chain(columns.iter().map(|c| format!("\"{}\"", c)))
        .collect::<Vec<_>>()
        .join(", ");
    let value_list = std::iter::once("$1".to_string())
        .chain(columns.iter().map(|c| format!("r.\"{}\"", c)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Statement {
        sql: format!(
            "WITH w AS (INSERT INTO \"{table}\" ({column_list}) SELECT {value_list} FROM jsonb_populate_record(NULL::\"{table}\", $2) r RETURNING *) SELECT row_to_json(w) AS row FROM w"
        ),
        tenant,
        params: vec![Value::Object(record)],
    })
}

pub fn update(kind: EntityKind, tenant: TenantId, target: Value, patch: Map<String, Value>) -> Result<Statement, DataError> {
    let record = prepare_update(patch, tenant)?;
    let table = kind.table();

    let assignments = record
        .keys()
        .map(|c| format!("\"{c}\" = (SELECT r.\"{c}\" FROM jsonb_populate_record(NULL::\"{table}\", $2) r)"))
        .collect::<Vec<_>>()
        .join(", ");

    let filter = scoped_filter(FilterData::with_where(target), tenant)?;
    let compiled = filter.compile_for(table, 2)?;

    let mut params = vec![Value::Object(record)];
    params.extend(compiled.params);

    Ok(Statement {
        sql: format!(
            "WITH w AS (UPDATE \"{table}\" SET {assignments} WHERE \"{}\" = $1 AND ({}) RETURNING *) SELECT row_to_json(w) AS row FROM w",
            TENANT_COLUMN, compiled.where_clause
        ),
        tenant,
        params,
    })
}

pub fn delete(kind: EntityKind, tenant: TenantId, target: Value) -> Result<Statement, DataError> {
    let filter = scoped_filter(FilterData::with_where(target), tenant)?;
    let compiled = filter.compile_for(kind.table(), 1)?;

    Ok(Statement {
        sql: format!(
            "WITH w AS (DELETE FROM \"{}\" WHERE \"{}\" = $1 AND ({}) RETURNING *) SELECT row_to_json(w) AS row FROM w",
            kind.table(),
            TENANT_COLUMN,
            compiled.where_clause
        ),
        tenant,
        params: compiled.params,
    })
}

/// Filter for a scoped read/write target. A top-level tenant condition from
/// the caller is accepted only when it names the context tenant; it is then
/// dropped in favour of the `$1` predicate every statement carries.
fn scoped_filter(filter_data: FilterData, tenant: TenantId) -> Result<Filter, DataError> {
    let mut filter = Filter::from_data(filter_data)?;
    if let Some(Value::Object(mut conditions)) = filter.take_where() {
        for key in [TENANT_COLUMN, TENANT_FIELD_ALIAS] {
            if let Some(value) = conditions.remove(key) {
                if !tenant_condition_matches(&value, tenant) {
                    tracing::warn!("Rejecting filter on {} = {} under tenant {}", key, value, tenant);
                    return Err(TenancyError::Mismatch { expected: tenant, found: value.to_string() }.into());
                }
            }
        }
        filter.where_clause(Value::Object(conditions))?;
    }
    Ok(filter)
}

fn tenant_condition_matches(value: &Value, tenant: TenantId) -> bool {
    match value {
        Value::Object(ops) if ops.len() == 1 => ops.get("$eq").map(|v| tenant_value_matches(v, tenant)).unwrap_or(false),
        other => tenant_value_matches(other, tenant),
    }
}

fn tenant_value_matches(value: &Value, tenant: TenantId) -> bool {
    value
        .as_str()
        .and_then(|s| s.parse::<TenantId>().ok())
        .map(|id| id == tenant)
        .unwrap_or(false)
}

/// Strip the tenant field from a write payload: absent or null is stamped
/// by the statement, equal is accepted, anything else is a mismatch.
fn take_tenant_field(payload: &mut Map<String, Value>, tenant: TenantId) -> Result<(), TenancyError> {
    for key in [TENANT_COLUMN, TENANT_FIELD_ALIAS] {
        match payload.remove(key) {
            None | Some(Value::Null) => {}
            Some(value) if tenant_value_matches(&value, tenant) => {}
            Some(value) => {
                tracing::warn!("Rejecting write with {} = {} under tenant {}", key, value, tenant);
                return Err(TenancyError::Mismatch { expected: tenant, found: value.to_string() });
            }
        }
    }
    Ok(())
}

fn prepare_insert(mut payload: Map<String, Value>, tenant: TenantId) -> Result<Map<String, Value>, DataError> {
    take_tenant_field(&mut payload, tenant)?;
    // Unset fields fall back to column defaults.
    payload.retain(|_, v| !v.is_null());
    for key in payload.keys() {
        validate_column(key)?;
        if SYSTEM_COLUMNS.contains(&key.as_str()) {
            return Err(DataError::InvalidPayload(format!("System field '{}' cannot be set", key)));
        }
    }
    Ok(payload)
}

fn prepare_update(mut patch: Map<String, Value>, tenant: TenantId) -> Result<Map<String, Value>, DataError> {
    take_tenant_field(&mut patch, tenant)?;
    for key in patch.keys() {
        validate_column(key)?;
        if SYSTEM_COLUMNS.contains(&key.as_str()) {
            return Err(DataError::InvalidPayload(format!("System field '{}' cannot be changed", key)));
        }
    }
    if patch.is_empty() {
        return Err(DataError::InvalidPayload("Nothing to update".to_string()));
    }
    Ok(patch)
}
