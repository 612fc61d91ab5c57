use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::tenancy::{BoundSession, Outcome, ScopedDataAccess, TenancyError, TenantContext};

/// Admits the request for exactly one tenant and binds a connection to it
/// before any handler runs; releases the binding once the handler is done.
///
/// Handlers reach storage only through the [`ScopedDataAccess`] this inserts.
pub async fn tenant_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let (ctx, session) = match admit_and_bind(&state, request.headers()).await {
        Ok(bound) => bound,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let access = match ScopedDataAccess::new(ctx.clone(), session.clone(), state.query_timeout()) {
        Ok(access) => access,
        Err(e) => {
            let _ = session.release(Outcome::Rollback).await;
            return ApiError::from(e).into_response();
        }
    };

    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(access);

    let response = next.run(request).await;

    let outcome = if response.status().is_success() || response.status().is_redirection() {
        Outcome::Commit
    } else {
        Outcome::Rollback
    };

    match session.release(outcome).await {
        Ok(()) => response,
        Err(e) if outcome == Outcome::Commit => ApiError::from(e).into_response(),
        Err(e) => {
            tracing::error!("Rollback after status {} failed: {}", response.status(), e);
            response
        }
    }
}

async fn admit_and_bind(state: &AppState, headers: &HeaderMap) -> Result<(TenantContext, BoundSession), TenancyError> {
    let ctx = state.admit(headers).await?;
    let session = state.bind(&ctx).await?;
    Ok((ctx, session))
}
