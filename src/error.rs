// Gateway error taxonomy and HTTP mapping
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::entitlement::DenyReason;
use crate::store::{StoreError, TenantStatus};

/// Terminal request errors surfaced by the gateway core. Each kind maps
/// to a distinct HTTP response; none is ever downgraded to a generic
/// error on the way out.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown identifier and wrong secret are deliberately
    /// indistinguishable (enumeration resistance).
    #[error("invalid credentials")]
    InvalidCredential,

    #[error("identifier is temporarily locked out")]
    LockedOut,

    #[error("session is unknown, revoked, or expired")]
    SessionInvalid,

    #[error("identity belongs to multiple tenants; tenant selection required")]
    AmbiguousTenant,

    #[error("identity has no tenant membership")]
    NoTenantMembership,

    #[error("tenant is {}", .0.as_str())]
    TenantUnavailable(TenantStatus),

    #[error("access to tenant {requested} denied for tenant {resolved}")]
    CrossTenantAccess { requested: Uuid, resolved: Uuid },

    #[error("feature denied: {0}")]
    Denied(DenyReason),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests(String),

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
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::TooManyRequests(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
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

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            // Uniform message for both unknown-user and wrong-secret.
            GatewayError::InvalidCredential => ApiError::unauthorized("Invalid credentials"),
            GatewayError::LockedOut => {
                ApiError::too_many_requests("Too many failed attempts, try again later")
            }
            GatewayError::SessionInvalid => ApiError::unauthorized("Session is invalid or expired"),
            GatewayError::AmbiguousTenant => {
                ApiError::conflict("Tenant selection required: identity belongs to multiple tenants")
            }
            GatewayError::NoTenantMembership => {
                ApiError::not_found("Identity has no tenant membership")
            }
            GatewayError::TenantUnavailable(status) => {
                ApiError::forbidden(format!("Tenant is {}", status.as_str()))
            }
            GatewayError::CrossTenantAccess { .. } => {
                ApiError::forbidden("Access to the requested tenant's data is denied")
            }
            GatewayError::Denied(reason) => {
                ApiError::forbidden(format!("Feature not available: {}", reason))
            }
            GatewayError::Store(e) => {
                if e.is_retryable() {
                    tracing::error!("store failure surfaced to client: {}", e);
                    ApiError::service_unavailable("Storage temporarily unavailable")
                } else {
                    // NotFound/Conflict from the store at this level means
                    // referenced data vanished mid-request.
                    tracing::error!("unexpected store error: {}", e);
                    ApiError::internal_server_error("An error occurred while processing your request")
                }
            }
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
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_gateway_error_maps_to_distinct_status() {
        let cases: Vec<(GatewayError, u16)> = vec![
            (GatewayError::InvalidCredential, 401),
            (GatewayError::LockedOut, 429),
            (GatewayError::SessionInvalid, 401),
            (GatewayError::AmbiguousTenant, 409),
            (GatewayError::NoTenantMembership, 404),
            (GatewayError::TenantUnavailable(TenantStatus::Suspended), 403),
            (
                GatewayError::CrossTenantAccess {
                    requested: Uuid::new_v4(),
                    resolved: Uuid::new_v4(),
                },
                403,
            ),
            (
                GatewayError::Store(StoreError::Transient("down".into())),
                503,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn credential_failure_message_is_uniform() {
        // Must not leak whether the user exists.
        let err = ApiError::from(GatewayError::InvalidCredential);
        assert_eq!(err.message(), "Invalid credentials");
    }
}
