//! Verification token storage.
//!
//! Tokens are keyed by owner: `user_id` is unique, so issuing a token for a
//! user atomically replaces whatever token that user held before. Lookups
//! never go by token value; the caller fetches by owner and verifies the
//! presented plaintext against the stored hash in-process.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::auth::{AuthError, AuthResult, TokenCodec};
use crate::models::VerificationToken;

#[derive(Debug, Clone)]
pub struct TokenStore {
    pool: SqlitePool,
    codec: TokenCodec,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: String,
    user_id: String,
    token_hash: String,
    expires_at: String,
    created_at: String,
    updated_at: String,
}

impl TokenStore {
    pub fn new(pool: SqlitePool, codec: TokenCodec) -> Self {
        Self { pool, codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Issues a new token for `user_id`, replacing any previous one.
    ///
    /// Returns the plaintext token; only its hash is stored. The replace is a
    /// single upsert, so concurrent issuance for one user leaves exactly one
    /// row (the last writer's).
    pub async fn issue_for(&self, user_id: Uuid, ttl: Duration) -> AuthResult<String> {
        let now = Utc::now();
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            AuthError::Internal(format!("token lifetime {} is out of range", ttl))
        })?;
        let created_at = format_timestamp(now);
        let expires_at = format_timestamp(expires_at);

        let plaintext = self.codec.generate();
        let token_hash = self.codec.hash_in_background(plaintext.clone()).await?;

        sqlx::query(
            r#"
            INSERT INTO verification_tokens (id, user_id, token_hash, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                id = excluded.id,
                token_hash = excluded.token_hash,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(&token_hash)
        .bind(&expires_at)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(%user_id, %expires_at, "Issued verification token");

        Ok(plaintext)
    }

    /// Looks up the token owned by `user_id`, expired or not.
    ///
    /// Callers must check [`VerificationToken::is_expired_at`]; the sweeper
    /// runs on an interval and gives no real-time guarantee.
    pub async fn find_by_owner(
        &self,
        user_id: Uuid,
    ) -> Result<Option<VerificationToken>, sqlx::Error> {
        let row: Option<TokenRow> =
            sqlx::query_as("SELECT * FROM verification_tokens WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_token).transpose()
    }

    /// Deletes a token by id.
    ///
    /// Returns `true` if this call removed the row. Deleting an absent token
    /// is not an error; it returns `false`.
    pub async fn consume(&self, token_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE id = ?")
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Removes all tokens whose expiry has passed.
    ///
    /// Returns the number of tokens removed.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Returns the number of tokens currently stored.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM verification_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn row_to_token(row: TokenRow) -> Result<VerificationToken, sqlx::Error> {
        Ok(VerificationToken {
            id: parse_uuid(&row.id)?,
            owner_user_id: parse_uuid(&row.user_id)?,
            token_hash: row.token_hash,
            expires_at: parse_timestamp(&row.expires_at)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::test_codec;
    use crate::db::init_db;
    use tempfile::TempDir;

    struct TestContext {
        store: TokenStore,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        TestContext {
            store: TokenStore::new(pool, test_codec()),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_issue_stores_hash_not_plaintext() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        let plaintext = ctx.store.issue_for(user_id, Duration::hours(1)).await.unwrap();
        let stored = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();

        assert_eq!(stored.owner_user_id, user_id);
        assert_ne!(stored.token_hash, plaintext);
        assert!(!stored.token_hash.contains(&plaintext));
        assert!(ctx.store.codec().verify(&plaintext, &stored.token_hash));
        assert!(!ctx
            .store
            .codec()
            .verify(&format!("{}x", plaintext), &stored.token_hash));
    }

    #[tokio::test]
    async fn test_issue_sets_expiry_from_ttl() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        let before = Utc::now();
        ctx.store.issue_for(user_id, Duration::hours(1)).await.unwrap();
        let stored = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();

        let remaining = stored.expires_at - before;
        assert!(remaining <= Duration::hours(1) + Duration::seconds(1));
        assert!(remaining >= Duration::minutes(59));
        assert!(!stored.is_expired());
    }

    #[tokio::test]
    async fn test_issue_rejects_unrepresentable_expiry() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        let result = ctx
            .store
            .issue_for(user_id, Duration::days(100_000_000))
            .await;

        assert!(matches!(result, Err(AuthError::Internal(_))));
        assert!(ctx.store.find_by_owner(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_token() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        let first = ctx.store.issue_for(user_id, Duration::hours(1)).await.unwrap();
        let first_row = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();
        let second = ctx.store.issue_for(user_id, Duration::hours(1)).await.unwrap();
        let second_row = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();

        assert_eq!(ctx.store.len().await.unwrap(), 1);
        assert_ne!(first_row.id, second_row.id);
        assert!(ctx.store.codec().verify(&second, &second_row.token_hash));
        assert!(!ctx.store.codec().verify(&first, &second_row.token_hash));
    }

    #[tokio::test]
    async fn test_concurrent_issue_leaves_one_row() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = ctx.store.clone();
                tokio::spawn(async move { store.issue_for(user_id, Duration::hours(1)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ctx.store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tokens_are_per_user() {
        let ctx = setup_store().await;
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        ctx.store.issue_for(alice, Duration::hours(1)).await.unwrap();
        ctx.store.issue_for(bob, Duration::hours(1)).await.unwrap();

        assert_eq!(ctx.store.len().await.unwrap(), 2);
        assert!(ctx.store.find_by_owner(alice).await.unwrap().is_some());
        assert!(ctx.store.find_by_owner(bob).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_unknown_owner() {
        let ctx = setup_store().await;
        let result = ctx.store.find_by_owner(Uuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_consume_is_idempotent() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        ctx.store.issue_for(user_id, Duration::hours(1)).await.unwrap();
        let token = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();

        assert!(ctx.store.consume(token.id).await.unwrap());
        assert!(!ctx.store.consume(token.id).await.unwrap());
        assert!(ctx.store.find_by_owner(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_still_returned_by_lookup() {
        let ctx = setup_store().await;
        let user_id = Uuid::new_v4();

        ctx.store.issue_for(user_id, Duration::zero()).await.unwrap();
        let token = ctx.store.find_by_owner(user_id).await.unwrap().unwrap();

        assert!(token.is_expired());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let ctx = setup_store().await;
        let live = Uuid::new_v4();

        ctx.store
            .issue_for(Uuid::new_v4(), Duration::zero())
            .await
            .unwrap();
        ctx.store
            .issue_for(Uuid::new_v4(), Duration::seconds(-30))
            .await
            .unwrap();
        ctx.store.issue_for(live, Duration::hours(1)).await.unwrap();

        assert_eq!(ctx.store.len().await.unwrap(), 3);

        let removed = ctx.store.purge_expired().await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(ctx.store.len().await.unwrap(), 1);
        assert!(ctx.store.find_by_owner(live).await.unwrap().is_some());
    }
}
