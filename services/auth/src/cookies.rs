//! Session cookies handed to the HTTP layer

use axum_extra::extract::cookie::{Cookie, SameSite};
use std::time::Duration;

use crate::config::{AuthConfig, Environment};

/// Cookie carrying the main session id
pub const SESSION_COOKIE_NAME: &str = "circa_session";

/// Cookie carrying the signup session id while the wallet is not yet linked
pub const SIGNUP_SESSION_COOKIE_NAME: &str = "circa_signup_session";

fn max_age(ttl: Duration) -> time::Duration {
    time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
}

/// Signup session cookie.
///
/// Production sends it cross-site (`Secure`, `SameSite=None`) so the wallet
/// step can run from the frontend origin.
pub fn signup_session_cookie(config: &AuthConfig, session_id: &str) -> Cookie<'static> {
    let same_site = match config.environment {
        Environment::Production => SameSite::None,
        Environment::Development => SameSite::Lax,
    };
    Cookie::build((SIGNUP_SESSION_COOKIE_NAME, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(config.environment.is_production())
        .same_site(same_site)
        .max_age(max_age(config.signup_session_ttl))
        .build()
}

/// Main session cookie
pub fn session_cookie(config: &AuthConfig, session_id: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(config.environment.is_production())
        .same_site(SameSite::Lax)
        .max_age(max_age(config.main_session_ttl))
        .build()
}

/// Expired main session cookie, sent on logout
pub fn clear_session_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .secure(config.environment.is_production())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production() -> AuthConfig {
        AuthConfig {
            environment: Environment::Production,
            ..AuthConfig::default()
        }
    }

    #[test]
    fn signup_cookie_in_development() {
        let cookie = signup_session_cookie(&AuthConfig::default(), "abc");

        assert_eq!(cookie.name(), SIGNUP_SESSION_COOKIE_NAME);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::minutes(30)));
    }

    #[test]
    fn signup_cookie_in_production() {
        let cookie = signup_session_cookie(&production(), "abc");

        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::None));
    }

    #[test]
    fn session_cookie_lasts_a_week() {
        let cookie = session_cookie(&production(), "abc");

        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn clearing_cookie_expires_immediately() {
        let cookie = clear_session_cookie(&AuthConfig::default());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
