//! Authentication pipeline configuration

use std::time::Duration;

/// Deployment environment, drives cookie security attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Authentication pipeline configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the frontend, used for magic links and the sign-in message URI
    pub frontend_url: String,
    pub environment: Environment,
    /// Nonce lifetime (default: 15 minutes)
    pub nonce_expiry: Duration,
    /// Signup session lifetime (default: 30 minutes)
    pub signup_session_ttl: Duration,
    /// Main session lifetime (default: 7 days)
    pub main_session_ttl: Duration,
    /// Signup and login magic link lifetime (default: 24 hours)
    pub magic_link_ttl: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            environment: Environment::Development,
            nonce_expiry: Duration::from_secs(15 * 60),
            signup_session_ttl: Duration::from_secs(30 * 60),
            main_session_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            magic_link_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl AuthConfig {
    /// Create a new AuthConfig from environment variables
    ///
    /// # Environment Variables
    /// - `FRONTEND_URL`: Frontend base URL (default: "http://localhost:5173")
    /// - `APP_ENV`: `production` enables secure cookies (default: development)
    /// - `NONCE_EXPIRY_SECONDS`: Nonce lifetime (default: 900)
    /// - `SIGNUP_SESSION_TTL_SECONDS`: Signup session lifetime (default: 1800)
    /// - `MAIN_SESSION_TTL_SECONDS`: Main session lifetime (default: 604800)
    /// - `MAGIC_LINK_TTL_SECONDS`: Magic link lifetime (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let frontend_url = std::env::var("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        let environment = std::env::var("APP_ENV")
            .map(|value| Environment::parse(&value))
            .unwrap_or(defaults.environment);

        Self {
            frontend_url,
            environment,
            nonce_expiry: seconds_from_env("NONCE_EXPIRY_SECONDS", defaults.nonce_expiry),
            signup_session_ttl: seconds_from_env(
                "SIGNUP_SESSION_TTL_SECONDS",
                defaults.signup_session_ttl,
            ),
            main_session_ttl: seconds_from_env("MAIN_SESSION_TTL_SECONDS", defaults.main_session_ttl),
            magic_link_ttl: seconds_from_env("MAGIC_LINK_TTL_SECONDS", defaults.magic_link_ttl),
        }
    }
}

pub(crate) fn seconds_from_env(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
