//! Session credentials.
//!
//! A session is an HS256 JWT carrying the user id. Nothing is stored
//! server-side: a credential is valid while its signature checks out against
//! the current secret and its `exp` has not passed.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AuthError, AuthResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,
    /// Expiry (Unix timestamp, seconds).
    pub exp: i64,
}

/// A freshly signed credential ready to be placed in a cookie.
#[derive(Debug, Clone)]
pub struct SessionCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub max_age: Duration,
}

#[derive(Clone)]
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn sign(&self, user_id: Uuid) -> AuthResult<SessionCredential> {
        self.sign_at(user_id, Utc::now())
    }

    /// Signs a credential as if issued at `issued_at`.
    pub fn sign_at(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> AuthResult<SessionCredential> {
        let expires_at = issued_at.checked_add_signed(self.ttl).ok_or_else(|| {
            AuthError::Internal(format!("session lifetime {} is out of range", self.ttl))
        })?;
        let claims = SessionClaims {
            user_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(SessionCredential {
            token,
            expires_at,
            max_age: self.ttl,
        })
    }

    /// Checks signature and expiry and returns the claims.
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
