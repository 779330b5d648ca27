//! Request plumbing for the HTTP front end.
//!
//! - [`Caller`]: extracts the calling principal from the `x-principal` header
//! - [`ApiError`]: maps oracle errors onto HTTP status codes

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::access::AuthorizationContext;
use crate::error::Error;

/// Header naming the calling principal
pub const PRINCIPAL_HEADER: &str = "x-principal";

// ═══════════════════════════════════════════════════════════════════════════════
// API RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON envelope for every response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded
    pub success: bool,
    /// Payload on success
    pub data: Option<T>,
    /// Error details on failure
    pub error: Option<ErrorBody>,
}

/// Error details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Numeric error code
    pub code: u32,
    /// Human-readable message
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// An error rendered as an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Body
    pub body: ErrorBody,
}

impl ApiError {
    /// Bad request with a message
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                code: 5001,
                message: message.into(),
            },
        }
    }

    fn missing_principal() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                code: 4001,
                message: format!("missing {} header", PRINCIPAL_HEADER),
            },
        }
    }
}

/// HTTP status for an oracle error
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Unauthorized(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) | Error::NoAggregatePrice => StatusCode::NOT_FOUND,
        Error::SourceAlreadyExists(_)
        | Error::TooManyRegistered { .. }
        | Error::InsufficientActiveSources { .. } => StatusCode::CONFLICT,
        Error::InvalidWeight { .. } | Error::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        Error::NoFreshSources { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::FetchFailed { .. } | Error::FetchTimeout { .. } | Error::InvalidSample { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            status: status_for(&error),
            body: ErrorBody {
                code: error.code(),
                message: error.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.body),
        };
        (self.status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALLER EXTRACTOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Authorization context built from the `x-principal` header
#[derive(Debug, Clone)]
pub struct Caller(pub AuthorizationContext);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(AuthorizationContext::new(value)))
            .ok_or_else(ApiError::missing_principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::Unauthorized("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&Error::NoAggregatePrice), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::NoFreshSources { active: 2, excluded: 2 }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::InsufficientActiveSources { active: 2, min: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&Error::Lock), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_carries_code() {
        let err = ApiError::from(Error::NotFound("feed".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.code, 1004);
        assert!(err.body.message.contains("feed"));
    }
}
