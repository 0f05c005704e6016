//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use stamp_common::{AttestationError, ChallengeError, RateLimitError, StampError};
use tracing::error;

const INTERNAL_ERROR: &str = "Unexpected server error";

/// Error returned by a route handler, rendered as `{"error": message}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }
}

impl From<StampError> for ApiError {
    fn from(err: StampError) -> Self {
        match &err {
            StampError::InvalidInput(_)
            | StampError::Attestation(
                AttestationError::UnknownChain(_)
                | AttestationError::InvalidRecipient(_)
                | AttestationError::InvalidCredentialHash(_)
                | AttestationError::InvalidScore(_),
            )
            | StampError::Challenge(ChallengeError::InvalidAddress(_)) => {
                Self::bad_request(err.to_string())
            }
            StampError::Challenge(_) | StampError::Unauthorized(_) => {
                Self::unauthorized(err.to_string())
            }
            StampError::RateLimit(RateLimitError::Exceeded) => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, err.to_string())
            }
            _ => {
                error!(error = %err, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        }
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        StampError::from(err).into()
    }
}

impl From<AttestationError> for ApiError {
    fn from(err: AttestationError) -> Self {
        StampError::from(err).into()
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        StampError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
