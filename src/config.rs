use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

use crate::mail::EmailConfig;

/// Shortest accepted session signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;
/// Longest accepted magic-link lifetime (one day).
pub const MAX_LINK_TTL_MINUTES: i64 = 24 * 60;
/// Longest accepted session lifetime.
pub const MAX_SESSION_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!(
                "Invalid environment '{}'. Valid options: development, production",
                s
            )),
        }
    }
}

/// Server configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    pub environment: Environment,
    /// Base URL that magic links point at
    pub public_url: String,
    /// Where the browser lands after a successful sign-in
    pub success_redirect_url: String,
    /// HMAC secret for session credentials
    pub jwt_secret: String,
    pub link_ttl_minutes: i64,
    pub session_ttl_days: i64,
    /// Seconds between expired-token sweeps
    pub sweep_interval_secs: u64,
    /// SMTP settings; mail is discarded when absent
    pub smtp: Option<EmailConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ebookchi")
                .join("auth.db"),
            environment: Environment::Development,
            public_url: "http://localhost:8080".to_string(),
            success_redirect_url: "http://localhost:3000/profile".to_string(),
            jwt_secret: String::new(),
            link_ttl_minutes: 60,
            session_ttl_days: 15,
            sweep_interval_secs: 300,
            smtp: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("environment", &self.environment)
            .field("public_url", &self.public_url)
            .field("success_redirect_url", &self.success_redirect_url)
            .field("link_ttl_minutes", &self.link_ttl_minutes)
            .field("session_ttl_days", &self.session_ttl_days)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("smtp", &self.smtp)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        config.apply_env()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = env_parse("EBOOKCHI_PORT")? {
            self.port = port;
        }
        if let Ok(path) = std::env::var("EBOOKCHI_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(environment) = env_parse("EBOOKCHI_ENV")? {
            self.environment = environment;
        }
        if let Ok(url) = std::env::var("EBOOKCHI_PUBLIC_URL") {
            self.public_url = url;
        }
        if let Ok(url) = std::env::var("EBOOKCHI_SUCCESS_REDIRECT_URL") {
            self.success_redirect_url = url;
        }
        if let Ok(secret) = std::env::var("EBOOKCHI_JWT_SECRET") {
            self.jwt_secret = secret;
        }
        if let Some(minutes) = env_parse("EBOOKCHI_LINK_TTL_MINUTES")? {
            self.link_ttl_minutes = minutes;
        }
        if let Some(days) = env_parse("EBOOKCHI_SESSION_TTL_DAYS")? {
            self.session_ttl_days = days;
        }
        if let Some(secs) = env_parse("EBOOKCHI_SWEEP_INTERVAL_SECS")? {
            self.sweep_interval_secs = secs;
        }

        // Setting the host is what enables SMTP from the environment
        if let Ok(host) = std::env::var("EBOOKCHI_SMTP_HOST") {
            self.smtp.get_or_insert_with(EmailConfig::default).host = host;
        }
        if let Some(smtp) = self.smtp.as_mut() {
            if let Some(port) = env_parse("EBOOKCHI_SMTP_PORT")? {
                smtp.port = port;
            }
            if let Ok(user) = std::env::var("EBOOKCHI_SMTP_USER") {
                smtp.user = Some(user);
            }
            if let Ok(pass) = std::env::var("EBOOKCHI_SMTP_PASS") {
                smtp.pass = Some(pass);
            }
            if let Ok(from) = std::env::var("EBOOKCHI_SMTP_FROM_EMAIL") {
                smtp.from_email = from;
            }
            if let Ok(name) = std::env::var("EBOOKCHI_SMTP_FROM_NAME") {
                smtp.from_name = name;
            }
        }

        Ok(())
    }

    /// Checks settings that have no safe default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "jwt_secret must be at least {} bytes (set EBOOKCHI_JWT_SECRET)",
                MIN_SECRET_LENGTH
            )));
        }
        if !(1..=MAX_LINK_TTL_MINUTES).contains(&self.link_ttl_minutes) {
            return Err(ConfigError::Invalid(format!(
                "link_ttl_minutes must be between 1 and {}",
                MAX_LINK_TTL_MINUTES
            )));
        }
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.session_ttl_days) {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_days must be between 1 and {}",
                MAX_SESSION_TTL_DAYS
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.public_url.trim().is_empty() {
            return Err(ConfigError::Invalid("public_url is required".to_string()));
        }
        Ok(())
    }

    /// Default config file path: ~/.config/ebookchi/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ebookchi")
            .join("config.yaml")
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
