//! Magic link issuance.

use chrono::Duration;
use uuid::Uuid;

use super::error::AuthResult;
use crate::db::{TokenStore, UserRepository};
use crate::mail::{verification_email, MailQueue};

/// Looks up (or creates) the user for an email, issues a token and queues
/// the sign-in email.
#[derive(Debug, Clone)]
pub struct LinkIssuer {
    users: UserRepository,
    tokens: TokenStore,
    mail: MailQueue,
    public_url: String,
    ttl: Duration,
}

impl LinkIssuer {
    pub fn new(
        users: UserRepository,
        tokens: TokenStore,
        mail: MailQueue,
        public_url: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            mail,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            ttl,
        }
    }

    /// Requests a sign-in link for `email`, which must already be validated.
    ///
    /// Unknown emails get a new standard account. Any link previously sent
    /// to the same user stops working. Delivery happens in the background;
    /// the result only reflects user lookup and token issuance.
    pub async fn request_link(&self, email: &str) -> AuthResult<()> {
        let (user, created) = self.users.find_or_create(email).await?;

        let token = self.tokens.issue_for(user.id, self.ttl).await?;
        let link = verify_url(&self.public_url, &token, user.id);

        let queued = self
            .mail
            .submit(verification_email(&user.email, &link, self.ttl.num_minutes()));

        tracing::info!(
            user_id = %user.id,
            new_user = created,
            queued,
            "Magic link issued"
        );

        Ok(())
    }
}

/// `<public_url>/auth/verify?token=..&userId=..`
pub fn verify_url(public_url: &str, token: &str, user_id: Uuid) -> String {
    format!(
        "{}/auth/verify?token={}&userId={}",
        public_url.trim_end_matches('/'),
        urlencoding::encode(token),
        user_id
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::codec::test_codec;
    use crate::db::init_db;
    use crate::mail::OutgoingEmail;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    pub(crate) struct TestContext {
        pub issuer: LinkIssuer,
        pub users: UserRepository,
        pub tokens: TokenStore,
        pub outbox: mpsc::Receiver<OutgoingEmail>,
        pub pool: sqlx::SqlitePool,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    pub(crate) async fn setup_issuer() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let tokens = TokenStore::new(pool.clone(), test_codec());
        let (mail, outbox) = MailQueue::channel();

        TestContext {
            issuer: LinkIssuer::new(
                users.clone(),
                tokens.clone(),
                mail,
                "http://localhost:8080/",
                Duration::hours(1),
            ),
            users,
            tokens,
            outbox,
            pool,
            _temp_dir: temp_dir,
        }
    }

    /// Pulls `(token, userId)` back out of a queued email.
    pub(crate) fn link_params(email: &OutgoingEmail) -> (String, String) {
        let start = email.text.find("/auth/verify?").expect("no link in email");
        let link = email.text[start..].split_whitespace().next().unwrap();
        let query = link.split_once('?').unwrap().1;

        let mut token = None;
        let mut user_id = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap();
            let value = urlencoding::decode(value).unwrap().into_owned();
            match key {
                "token" => token = Some(value),
                "userId" => user_id = Some(value),
                _ => {}
            }
        }
        (token.unwrap(), user_id.unwrap())
    }

    #[test]
    fn test_verify_url_format() {
        let user_id = Uuid::new_v4();
        let url = verify_url("https://books.example.com/", "a-b_c", user_id);
        assert_eq!(
            url,
            format!(
                "https://books.example.com/auth/verify?token=a-b_c&userId={}",
                user_id
            )
        );
    }

    #[tokio::test]
    async fn test_request_link_creates_incomplete_user() {
        let mut ctx = setup_issuer().await;

        ctx.issuer.request_link("a@b.com.au").await.unwrap();

        let user = ctx.users.find_by_email("a@b.com.au").await.unwrap().unwrap();
        assert!(!user.signed_up);
        assert_eq!(user.role, crate::models::UserRole::Standard);

        let email = ctx.outbox.recv().await.unwrap();
        assert_eq!(email.to, "a@b.com.au");
        let (_, user_id) = link_params(&email);
        assert_eq!(user_id, user.id.to_string());
    }

    #[tokio::test]
    async fn test_request_link_emails_plaintext_and_stores_hash() {
        let mut ctx = setup_issuer().await;

        ctx.issuer.request_link("reader@example.com").await.unwrap();

        let email = ctx.outbox.recv().await.unwrap();
        let (token, user_id) = link_params(&email);
        let stored = ctx
            .tokens
            .find_by_owner(user_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(token.len(), crate::auth::codec::TOKEN_LENGTH);
        assert_ne!(stored.token_hash, token);
        assert!(ctx.tokens.codec().verify(&token, &stored.token_hash));
    }

    #[tokio::test]
    async fn test_request_link_reuses_existing_user() {
        let mut ctx = setup_issuer().await;

        ctx.issuer.request_link("reader@example.com").await.unwrap();
        ctx.issuer.request_link("reader@example.com").await.unwrap();

        assert_eq!(ctx.users.list().await.unwrap().len(), 1);
        assert_eq!(ctx.tokens.len().await.unwrap(), 1);

        let first = ctx.outbox.recv().await.unwrap();
        let second = ctx.outbox.recv().await.unwrap();
        assert_ne!(link_params(&first).0, link_params(&second).0);
    }

    #[tokio::test]
    async fn test_request_link_succeeds_when_mail_is_down() {
        let ctx = setup_issuer().await;
        drop(ctx.outbox);

        ctx.issuer.request_link("reader@example.com").await.unwrap();

        assert_eq!(ctx.tokens.len().await.unwrap(), 1);
    }
}
