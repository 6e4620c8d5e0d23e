//! The `authToken` session cookie.

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};

pub const SESSION_COOKIE: &str = "authToken";

/// `Set-Cookie` value carrying a session credential.
///
/// Always `HttpOnly` and `SameSite=Strict`; `Secure` is added when `secure`.
pub fn session_cookie(
    value: &str,
    max_age: chrono::Duration,
    expires_at: DateTime<Utc>,
    secure: bool,
) -> String {
    let mut parts = vec![
        format!("{}={}", SESSION_COOKIE, value),
        "HttpOnly".to_string(),
    ];
    if secure {
        parts.push("Secure".to_string());
    }
    parts.push("SameSite=Strict".to_string());
    parts.push("Path=/".to_string());
    parts.push(format!("Max-Age={}", max_age.num_seconds()));
    parts.push(format!(
        "Expires={}",
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT")
    ));

    parts.join("; ")
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> String {
    let mut parts = vec![format!("{}=", SESSION_COOKIE), "HttpOnly".to_string()];
    if secure {
        parts.push("Secure".to_string());
    }
    parts.push("SameSite=Strict".to_string());
    parts.push("Path=/".to_string());
    parts.push("Max-Age=0".to_string());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string());

    parts.join("; ")
}

/// Finds a cookie by name across all `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
