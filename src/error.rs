//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{PoolName, SessionId};
use crate::transport::TransportError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "pool not found: room1"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                        |
/// |-----------|-------------------|------------------------------------|
/// | 1000–1999 | Client input      | 400 Bad Request                    |
/// | 2000–2999 | Registry          | 404 / 409 / 500 (legacy contract)  |
/// | 3000–3999 | Transport         | 500 Internal Server Error          |
///
/// Missing pools and duplicate pool names answer 500: existing clients
/// treat any 5xx on create/join as "pool unavailable".
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No pool is registered under this name.
    #[error("pool not found: {0}")]
    PoolNotFound(PoolName),

    /// No session is registered under this identifier.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A pool with this name already exists.
    #[error("pool {0} already exists")]
    DuplicateName(PoolName),

    /// A session with this identifier is already registered in the pool.
    #[error("session {0} already exists")]
    SessionExists(SessionId),

    /// The connection offer was malformed or rejected by the transport.
    #[error("bad offer: {0}")]
    BadOffer(String),

    /// Malformed encoding or oversized payload at the HTTP boundary.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Peer connection construction, negotiation or close failed.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Delivering a broadcast to one recipient failed.
    #[error("send failure: {0}")]
    SendFailure(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::BadInput(_) => 1001,
            Self::BadOffer(_) => 1002,
            Self::PoolNotFound(_) => 2001,
            Self::SessionNotFound(_) => 2002,
            Self::DuplicateName(_) => 2003,
            Self::SessionExists(_) => 2004,
            Self::TransportFailure(_) => 3001,
            Self::SendFailure(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadInput(_) | Self::BadOffer(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionExists(_) => StatusCode::CONFLICT,
            Self::PoolNotFound(_)
            | Self::DuplicateName(_)
            | Self::TransportFailure(_)
            | Self::SendFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for registry lookup misses.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PoolNotFound(_) | Self::SessionNotFound(_))
    }
}

impl From<TransportError> for RelayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidOffer(msg) => Self::BadOffer(msg),
            TransportError::Send(msg) => Self::SendFailure(msg),
            other => Self::TransportFailure(other.to_string()),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
