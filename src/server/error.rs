//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::AuthError;
use crate::validation::FieldErrors;

/// Same message for every rejected magic link.
pub const INVALID_LINK_MESSAGE: &str = "Invalid or expired token!";
const GENERIC_INTERNAL_MESSAGE: &str = "Something went wrong!";

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// An error ready to be sent to the client.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a field map body.
    Validation(FieldErrors),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

impl ApiError {
    /// Maps a core error to a response, logging the full detail.
    ///
    /// Internal detail reaches the client only when `expose_internal` is set
    /// (development).
    pub fn from_auth(err: AuthError, expose_internal: bool) -> Self {
        match err {
            AuthError::Validation(fields) => ApiError::Validation(fields),
            AuthError::InvalidToken | AuthError::TokenExpired => {
                tracing::debug!("Rejected magic link: {}", err);
                ApiError::Forbidden(INVALID_LINK_MESSAGE.to_string())
            }
            AuthError::Unauthenticated => {
                ApiError::Unauthorized("Authentication token is missing".to_string())
            }
            AuthError::Session(e) => {
                tracing::warn!("Rejected session credential: {}", e);
                ApiError::Unauthorized("Invalid or expired session".to_string())
            }
            AuthError::UserNotFound => ApiError::NotFound("User not found".to_string()),
            AuthError::Inconsistent(_) | AuthError::Database(_) | AuthError::Internal(_) => {
                tracing::error!("Request failed: {}", err);
                if expose_internal {
                    ApiError::Internal(err.to_string())
                } else {
                    ApiError::Internal(GENERIC_INTERNAL_MESSAGE.to_string())
                }
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(fields) => (status, Json(fields)).into_response(),
            ApiError::BadRequest(error)
            | ApiError::Unauthorized(error)
            | ApiError::Forbidden(error)
            | ApiError::NotFound(error)
            | ApiError::Internal(error) => (status, Json(ErrorBody { error })).into_response(),
        }
    }
}
