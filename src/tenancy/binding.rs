use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::context::{TenantContext, TenantId};
use super::error::TenancyError;
use crate::config::{AppConfig, BindingStrategy};

/// Connection/transaction setting read by the row-level security policies.
pub const TENANT_SETTING: &str = "app.tenant_id";

#[derive(Debug, Clone, Copy)]
pub struct BindingOptions {
    pub strategy: BindingStrategy,
    pub bind_timeout: Duration,
    pub statement_timeout: Duration,
}

impl BindingOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            strategy: config.tenancy.binding,
            bind_timeout: config.tenancy.bind_timeout(),
            statement_timeout: Duration::from_millis(config.database.statement_timeout_ms),
        }
    }
}

/// How a request finished, which decides commit or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Commit,
    Rollback,
}

enum SessionConn {
    Transaction(Transaction<'static, Postgres>),
    Checkout(PoolConnection<Postgres>),
}

/// The physical connection serving one request, with the tenant marker set on it.
///
/// Created only from a [`TenantContext`]; `release` consumes it. Dropping it
/// unreleased rolls back (transaction) or closes the connection (checkout),
/// so the marker can never reach another request.
pub struct TenantSession {
    tenant_id: TenantId,
    strategy: BindingStrategy,
    conn: Option<SessionConn>,
}

impl TenantSession {
    pub async fn bind(pool: &PgPool, ctx: &TenantContext, options: &BindingOptions) -> Result<Self, TenancyError> {
        let tenant_id = ctx.tenant_id();

        let establish = async {
            match options.strategy {
                BindingStrategy::Transaction => {
                    let mut tx = pool.begin().await.map_err(binding_error)?;
                    apply_marker(&mut tx, tenant_id, options.statement_timeout, true).await?;
                    Ok::<_, TenancyError>(SessionConn::Transaction(tx))
                }
                BindingStrategy::Checkout => {
                    let mut conn = pool.acquire().await.map_err(binding_error)?;
                    if let Err(e) = apply_marker(&mut conn, tenant_id, options.statement_timeout, false).await {
                        drop(conn.detach());
                        return Err(e);
                    }
                    Ok(SessionConn::Checkout(conn))
                }
            }
        };

        let conn = tokio::time::timeout(options.bind_timeout, establish)
            .await
            .map_err(|_| {
                tracing::error!("Binding tenant {} timed out after {:?}", tenant_id, options.bind_timeout);
                TenancyError::BindingFailure(format!("binding timed out after {:?}", options.bind_timeout))
            })?
            .map_err(|e| {
                tracing::error!("Binding tenant {} failed: {}", tenant_id, e);
                e
            })?;

        tracing::debug!("Bound tenant {} ({:?})", tenant_id, options.strategy);
        Ok(Self {
            tenant_id,
            strategy: options.strategy,
            conn: Some(conn),
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn strategy(&self) -> BindingStrategy {
        self.strategy
    }

    /// The bound connection. Every scoped query for the request runs here.
    pub fn connection(&mut self) -> Result<&mut PgConnection, TenancyError> {
        match self.conn.as_mut() {
            Some(SessionConn::Transaction(tx)) => Ok(&mut **tx),
            Some(SessionConn::Checkout(conn)) => Ok(&mut **conn),
            None => Err(TenancyError::BindingFailure("session already released".to_string())),
        }
    }

    pub async fn release(mut self, outcome: Outcome) -> Result<(), TenancyError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match conn {
            SessionConn::Transaction(tx) => {
                let result = match outcome {
                    Outcome::Commit => tx.commit().await,
                    Outcome::Rollback => tx.rollback().await,
                };
                result.map_err(|e| {
                    tracing::error!("Releasing tenant {} ({:?}) failed: {}", self.tenant_id, outcome, e);
                    TenancyError::BindingFailure(format!("{:?} failed: {}", outcome, e))
                })?;
            }
            SessionConn::Checkout(mut conn) => {
                // Statements already auto-committed one by one; only the marker matters here.
                if let Err(e) = reset_marker(&mut conn).await {
                    tracing::error!("Resetting tenant marker failed, closing connection: {}", e);
                    drop(conn.detach());
                }
            }
        }

        tracing::debug!("Released tenant {} ({:?}, {:?})", self.tenant_id, self.strategy, outcome);
        Ok(())
    }
}

impl Drop for TenantSession {
    fn drop(&mut self) {
        match self.conn.take() {
            Some(SessionConn::Checkout(conn)) => {
                tracing::warn!("Tenant session for {} dropped unreleased, closing its connection", self.tenant_id);
                drop(conn.detach());
            }
            Some(SessionConn::Transaction(_)) => {
                // sqlx queues a ROLLBACK when a transaction is dropped
                tracing::warn!("Tenant session for {} dropped unreleased, rolling back", self.tenant_id);
            }
            None => {}
        }
    }
}

/// A [`TenantSession`] shared between the guard middleware (which owns its
/// lifetime) and the handlers of one request (which borrow its connection).
#[derive(Clone)]
pub struct BoundSession {
    tenant_id: TenantId,
    inner: Arc<Mutex<Option<TenantSession>>>,
}

impl BoundSession {
    pub fn new(session: TenantSession) -> Self {
        Self {
            tenant_id: session.tenant_id(),
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, TenantSession>, TenancyError> {
        let guard = self.inner.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut())
            .map_err(|_| TenancyError::BindingFailure("session already released".to_string()))
    }

    pub async fn release(&self, outcome: Outcome) -> Result<(), TenancyError> {
        let session = self.inner.lock().await.take();
        match session {
            Some(session) => session.release(outcome).await,
            None => Ok(()),
        }
    }
}

async fn apply_marker(
    conn: &mut PgConnection,
    tenant_id: TenantId,
    statement_timeout: Duration,
    local: bool,
) -> Result<(), TenancyError> {
    let expected = tenant_id.to_string();

    let applied: Option<String> = sqlx::query_scalar("SELECT set_config($1, $2, $3)")
        .bind(TENANT_SETTING)
        .bind(&expected)
        .bind(local)
        .fetch_one(&mut *conn)
        .await
        .map_err(binding_error)?;

    if applied.as_deref() != Some(expected.as_str()) {
        return Err(TenancyError::BindingFailure(format!(
            "store applied {:?} for {}",
            applied, TENANT_SETTING
        )));
    }

    sqlx::query("SELECT set_config('statement_timeout', $1, $2)")
        .bind(statement_timeout.as_millis().to_string())
        .bind(local)
        .execute(&mut *conn)
        .await
        .map_err(binding_error)?;

    Ok(())
}

async fn reset_marker(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config($1, '', false)")
        .bind(TENANT_SETTING)
        .execute(&mut *conn)
        .await?;
    sqlx::query("RESET statement_timeout").execute(&mut *conn).await?;
    Ok(())
}

/// Pool-level backstop for the checkout strategy: whatever path a connection
/// takes back into the pool, it arrives there without a tenant marker.
pub async fn clear_on_release(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    reset_marker(conn).await?;
    Ok(true)
}

fn binding_error(e: sqlx::Error) -> TenancyError {
    TenancyError::BindingFailure(e.to_string())
}
