use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Standard,
    Admin,
    Author,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Standard => "standard",
            UserRole::Admin => "admin",
            UserRole::Author => "author",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" | "user" => Ok(UserRole::Standard),
            "admin" => Ok(UserRole::Admin),
            "author" => Ok(UserRole::Author),
            _ => Err(format!(
                "Invalid role '{}'. Valid options: standard, admin, author",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(UserRole::Standard.to_string(), "standard");
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert_eq!(UserRole::Author.to_string(), "author");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(UserRole::from_str("ADMIN").unwrap(), UserRole::Admin);
        assert_eq!(UserRole::from_str(" author ").unwrap(), UserRole::Author);
        // Legacy records used "user" for the standard role
        assert_eq!(UserRole::from_str("user").unwrap(), UserRole::Standard);
    }

    #[test]
    fn test_role_from_str_invalid() {
        let err = UserRole::from_str("superuser").unwrap_err();
        assert!(err.contains("Valid options"));
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&UserRole::Author).unwrap();
        assert_eq!(json, "\"author\"");
        let parsed: UserRole = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(parsed, UserRole::Standard);
    }
}
