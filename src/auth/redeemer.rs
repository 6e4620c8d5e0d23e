//! Magic link redemption.
//!
//! Checks run in a fixed order and the first failure is final:
//!
//! 1. `token` and `userId` are present and non-empty
//! 2. the user owns a token
//! 3. the presented token matches the stored hash
//! 4. the token has not expired
//! 5. the user still exists
//!
//! Only then is a session minted and the token deleted. Any failure leaves
//! the stored token untouched.

use chrono::Utc;
use uuid::Uuid;

use super::error::{AuthError, AuthResult};
use super::session::{SessionCredential, SessionSigner};
use crate::db::{TokenStore, UserRepository};
use crate::models::User;

/// Outcome of a successful redemption.
#[derive(Debug, Clone)]
pub struct RedeemedSession {
    pub user: User,
    pub credential: SessionCredential,
}

#[derive(Debug, Clone)]
pub struct LinkRedeemer {
    tokens: TokenStore,
    users: UserRepository,
    sessions: SessionSigner,
}

impl LinkRedeemer {
    pub fn new(tokens: TokenStore, users: UserRepository, sessions: SessionSigner) -> Self {
        Self {
            tokens,
            users,
            sessions,
        }
    }

    pub async fn redeem(
        &self,
        token: Option<&str>,
        user_id: Option<&str>,
    ) -> AuthResult<RedeemedSession> {
        // Blank means missing; anything else is checked exactly as presented
        let token = token.filter(|t| !t.trim().is_empty());
        let user_id = user_id.filter(|u| !u.trim().is_empty());
        let (Some(token), Some(user_id)) = (token, user_id) else {
            return Err(AuthError::field("token", "Invalid request!"));
        };

        // A malformed id cannot own a token
        let Ok(user_id) = Uuid::parse_str(user_id) else {
            tracing::warn!("Redemption rejected: malformed user id");
            return Err(AuthError::InvalidToken);
        };

        let Some(stored) = self.tokens.find_by_owner(user_id).await? else {
            tracing::warn!(%user_id, "Redemption rejected: no token for user");
            return Err(AuthError::InvalidToken);
        };

        let matches = self
            .tokens
            .codec()
            .verify_in_background(token.to_string(), stored.token_hash.clone())
            .await?;
        if !matches {
            tracing::warn!(%user_id, "Redemption rejected: token mismatch");
            return Err(AuthError::InvalidToken);
        }

        if stored.is_expired_at(Utc::now()) {
            tracing::warn!(%user_id, expires_at = %stored.expires_at, "Redemption rejected: token expired");
            return Err(AuthError::TokenExpired);
        }

        let Some(user) = self.users.find_by_id(user_id).await? else {
            tracing::error!(%user_id, "Token owner does not exist");
            return Err(AuthError::Inconsistent(format!(
                "verification token {} belongs to missing user {}",
                stored.id, user_id
            )));
        };

        // Signed before consuming so a signing failure leaves the link usable
        let credential = self
            .sessions
            .sign(user.id)
            .map_err(|e| AuthError::Internal(format!("failed to sign session: {}", e)))?;

        // Lost a race with another redemption or a reissue
        if !self.tokens.consume(stored.id).await? {
            tracing::warn!(%user_id, "Redemption rejected: token already consumed");
            return Err(AuthError::InvalidToken);
        }
        tracing::info!(user_id = %user.id, "Magic link redeemed");

        Ok(RedeemedSession { user, credential })
    }
}
