//! Auth endpoints: signup, login, session, verification, password reset.

pub mod login;
pub mod password;
pub mod session;
pub mod signup;
pub mod types;
pub mod verification;

use axum::{
    Json,
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::auth::{AuthConfig, AuthError, SESSION_COOKIE_NAME};

/// Map a service error to the documented status/message pairs. Internal
/// faults are logged here and surfaced as a generic 500.
pub(super) fn error_response(err: &AuthError) -> Response {
    let (status, message) = match err {
        AuthError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::AlreadyExists | AuthError::PreconditionFailed => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        AuthError::InvalidCredentials
        | AuthError::TokenInvalid
        | AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
        AuthError::NotInitialized | AuthError::Internal(_) => {
            error!("auth operation failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    };
    (status, Json(json!({ "message": message }))).into_response()
}

/// `Set-Cookie` value for a fresh session.
pub(super) fn session_cookie_value(config: &AuthConfig, token: &str) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.session_ttl_seconds()
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub(super) fn clear_session_cookie_value(config: &AuthConfig) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Plain `302 Found`, as browsers expect from the emailed links.
pub(super) fn redirect_found(location: &str) -> Response {
    match axum::http::HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => {
            error!("invalid redirect location: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
