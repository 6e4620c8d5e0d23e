//! Typed request bodies and their validation rules.
//!
//! Each body deserializes leniently (every field optional, any JSON type) and
//! is then checked by `validate`, which returns either the cleaned value or a
//! map of field name to error messages that is safe to show the client.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field name to list of messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const EMAIL_MIN_LENGTH: usize = 10;
pub const NAME_MIN_LENGTH: usize = 3;
pub const NAME_MAX_LENGTH: usize = 64;

/// Body of `POST /auth/generate-link`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateLinkRequest {
    #[serde(default)]
    pub email: Option<Value>,
}

impl GenerateLinkRequest {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: Some(Value::String(email.into())),
        }
    }

    /// Returns the trimmed, lower-cased email.
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();

        let raw = match self.email {
            None | Some(Value::Null) => {
                add_error(&mut errors, "email", "Email is required");
                return Err(errors);
            }
            Some(Value::String(raw)) => raw,
            Some(_) => {
                add_error(&mut errors, "email", "Invalid email format");
                return Err(errors);
            }
        };

        let email = raw.trim().to_lowercase();
        if !is_valid_email(&email) {
            add_error(&mut errors, "email", "Invalid email format");
        }
        if email.chars().count() < EMAIL_MIN_LENGTH {
            add_error(&mut errors, "email", "Minimum length is 10 characters");
        }

        if errors.is_empty() {
            Ok(email)
        } else {
            Err(errors)
        }
    }
}

/// Body of `PUT /auth/profile`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<Value>,
}

impl UpdateProfileRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(Value::String(name.into())),
        }
    }

    /// Returns the trimmed name. Anything but a string counts as missing.
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();

        let name = match &self.name {
            Some(Value::String(name)) => name.trim(),
            _ => "",
        };
        let len = name.chars().count();
        if name.is_empty() {
            add_error(&mut errors, "name", "Name is required");
        } else if len < NAME_MIN_LENGTH {
            add_error(&mut errors, "name", "Name must be at least 3 characters");
        } else if len > NAME_MAX_LENGTH {
            add_error(&mut errors, "name", "Name must be at most 64 characters");
        }

        if errors.is_empty() {
            Ok(name.to_string())
        } else {
            Err(errors)
        }
    }
}

/// Query string of `GET /auth/verify`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    pub token: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

pub fn add_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Basic structural check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !email.chars().any(char::is_whitespace)
}
