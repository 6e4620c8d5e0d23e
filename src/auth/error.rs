//! Authentication error types.

use thiserror::Error;

use crate::validation::FieldErrors;

/// Errors produced by the token lifecycle and session handling.
///
/// `InvalidToken` and `TokenExpired` are kept apart for logging only; the
/// HTTP layer reports both with the same message.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Request failed boundary validation.
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),
    /// No token for the claimed user, or the presented token does not match.
    #[error("invalid or expired token")]
    InvalidToken,
    /// The token matched but its expiry has passed.
    #[error("token expired")]
    TokenExpired,
    /// No session credential was presented.
    #[error("authentication token is missing")]
    Unauthenticated,
    /// A valid session refers to a user that no longer exists.
    #[error("user not found")]
    UserNotFound,
    /// Stored state contradicts itself (e.g. a token whose owner is gone).
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Session credential could not be signed or verified.
    #[error("session error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Convenience for single-field validation failures.
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        crate::validation::add_error(&mut errors, field, message);
        AuthError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error() {
        let err = AuthError::field("token", "Token is required");
        match err {
            AuthError::Validation(errors) => {
                assert_eq!(errors["token"], vec!["Token is required"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(AuthError::InvalidToken.to_string(), "invalid or expired token");
        assert!(AuthError::Internal("boom".into()).to_string().contains("boom"));
    }
}
