use thiserror::Error;

use super::context::TenantId;

/// Every way tenant isolation refuses to let a request or an operation proceed.
///
/// None of these are recovered by continuing unscoped.
#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Tenant ID required")]
    NotResolved,

    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant is inactive: {0}")]
    Inactive(TenantId),

    #[error("Tenant mismatch: request is bound to {expected}, payload names {found}")]
    Mismatch { expected: TenantId, found: String },

    #[error("Tenant binding failed: {0}")]
    BindingFailure(String),

    #[error("Tenant lookup failed: {0}")]
    LookupFailure(String),
}

impl TenancyError {
    /// Transient infrastructure conditions the client may retry.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TenancyError::BindingFailure(_) | TenancyError::LookupFailure(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            TenancyError::NotResolved => "TENANT_NOT_RESOLVED",
            TenancyError::NotFound(_) => "TENANT_NOT_FOUND",
            TenancyError::Inactive(_) => "TENANT_INACTIVE",
            TenancyError::Mismatch { .. } => "TENANT_MISMATCH",
            TenancyError::BindingFailure(_) => "TENANT_BINDING_FAILURE",
            TenancyError::LookupFailure(_) => "TENANT_LOOKUP_FAILURE",
        }
    }
}

/// Failure of a scoped data-access call.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    #[error(transparent)]
    Filter(#[from] crate::filter::FilterError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Record not found")]
    NotFound,

    #[error("Query timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Row decoding failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
