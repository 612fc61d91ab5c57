// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::filter::FilterError;
use crate::tenancy::entity::UnknownEntity;
use crate::tenancy::{DataError, TenancyError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),

    // 401 / 403 / 503, decided by the tenancy failure kind
    Tenancy {
        status: u16,
        code: &'static str,
        message: String,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Tenancy { status, .. } => *status,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Tenancy { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Tenancy { code, .. } => *code,
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        let (status, message) = match &err {
            TenancyError::NotResolved => (401, err.to_string()),
            TenancyError::NotFound(_) | TenancyError::Inactive(_) | TenancyError::Mismatch { .. } => {
                (403, err.to_string())
            }
            TenancyError::BindingFailure(detail) | TenancyError::LookupFailure(detail) => {
                // Infrastructure details stay in the logs
                tracing::error!("{}: {}", err.code(), detail);
                (503, "Tenant storage temporarily unavailable".to_string())
            }
        };
        ApiError::Tenancy {
            status,
            code: err.code(),
            message,
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<UnknownEntity> for ApiError {
    fn from(err: UnknownEntity) -> Self {
        ApiError::not_found(err.to_string())
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Tenancy(e) => e.into(),
            DataError::Filter(e) => e.into(),
            DataError::InvalidPayload(msg) => ApiError::bad_request(msg),
            DataError::NotFound => ApiError::not_found("Record not found"),
            DataError::Timeout(after) => {
                tracing::warn!("Scoped query timed out after {:?}", after);
                ApiError::service_unavailable("Request timed out")
            }
            DataError::Decode(e) => {
                tracing::error!("Row decoding error: {}", e);
                ApiError::internal_server_error("Failed to format response")
            }
            DataError::Sqlx(e) => from_sqlx(e),
        }
    }
}

/// Constraint and type violations are the caller's fault; the rest is ours.
fn from_sqlx(err: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db) = &err {
        let message = db.message().to_string();
        match db.code().as_deref() {
            // undefined_column, invalid_text_representation, datetime_field_overflow,
            // invalid_datetime_format, not_null_violation, foreign_key_violation,
            // check_violation, datatype_mismatch, undefined_function
            Some("42703" | "22P02" | "22008" | "22007" | "23502" | "23503" | "23514" | "42804" | "42883") => {
                return ApiError::bad_request(message);
            }
            Some("23505") => return ApiError::conflict(message),
            // query_canceled (statement_timeout)
            Some("57014") => return ApiError::service_unavailable("Request timed out"),
            _ => {}
        }
    }

    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            tracing::error!("Database unavailable: {}", err);
            ApiError::service_unavailable("Database temporarily unavailable")
        }
        other => {
            // Log the real error but return generic message
            tracing::error!("SQLx error: {}", other);
            ApiError::internal_server_error("Database error occurred")
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
