use chrono::Utc;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp, parse_uuid};
use crate::models::{User, UserRole};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    role: String,
    signed_up: bool,
    created_at: String,
    updated_at: String,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub(crate) async fn create(&self, user: &User) -> Result<User, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, signed_up, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.signed_up)
        .bind(format_timestamp(user.created_at))
        .bind(format_timestamp(user.updated_at))
        .execute(&self.pool)
        .await?;

        self.find_by_id(user.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_user).transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_user).transpose()
    }

    /// Returns the user with this email, creating a standard account that
    /// has not completed signup if none exists.
    ///
    /// The boolean is `true` when this call created the account. Concurrent
    /// calls for the same email resolve to a single row.
    pub async fn find_or_create(&self, email: &str) -> Result<(User, bool), sqlx::Error> {
        let candidate = User::new(email);

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, signed_up, created_at, updated_at)
            VALUES (?, ?, NULL, ?, 0, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(candidate.id.to_string())
        .bind(&candidate.email)
        .bind(candidate.role.as_str())
        .bind(format_timestamp(candidate.created_at))
        .bind(format_timestamp(candidate.updated_at))
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let user = self
            .find_by_email(email)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        if created {
            tracing::info!(user_id = %user.id, "Created account on first sign-in request");
        }

        Ok((user, created))
    }

    /// Sets the display name and marks signup as complete.
    ///
    /// Returns `None` if the user does not exist.
    pub async fn update_profile(&self, id: Uuid, name: &str) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET name = ?, signed_up = 1, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(format_timestamp(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    /// Changes a user's role. Returns `None` if no user has this email.
    pub async fn set_role(&self, email: &str, role: UserRole) -> Result<Option<User>, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE email = ?")
            .bind(role.as_str())
            .bind(format_timestamp(Utc::now()))
            .bind(email)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_email(email).await
    }

    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT * FROM users ORDER BY created_at, email")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: UserRow) -> Result<User, sqlx::Error> {
        let role = UserRole::from_str(&row.role).map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(User {
            id: parse_uuid(&row.id)?,
            email: row.email,
            name: row.name,
            role,
            signed_up: row.signed_up,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}
