//! Credential core: password hashing, the token cipher, and the auth
//! service orchestrating them over the session store.

pub mod error;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

pub use error::AuthError;
pub use service::{AuthService, SessionInfo, SessionView, UserView};
pub use token::{TokenCipher, TokenError};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 60 * 60 * 24 * 30;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "web.session";

/// Static configuration for the auth service.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    /// `base_url` is where the frontend (and this API) are served; it is
    /// used for the links embedded in emails and to decide cookie security.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Cookies are only marked `Secure` when the site is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = AuthConfig::new("https://parola.dev".to_string());
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert!(config.session_cookie_secure());

        let config = config.with_session_ttl_seconds(60);
        assert_eq!(config.session_ttl_seconds(), 60);
    }

    #[test]
    fn local_dev_cookie_is_not_secure() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }
}
