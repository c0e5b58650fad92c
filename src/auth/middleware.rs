//! Request gate for protected routes.
//!
//! Resolves the session cookie exactly like session introspection, then
//! additionally requires a verified email. Unverified users may hold a
//! perfectly valid session (they can reach the app shell and
//! `/auth/session`) but are denied the protected operations until the
//! verification link is clicked.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode, header::COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::auth::service::{SessionView, UserView};
use crate::auth::{AuthService, SESSION_COOKIE_NAME};

/// Resolved identity attached to the request for downstream handlers.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: UserView,
    pub session: SessionView,
}

/// Pull the session token out of the `Cookie` header, if present.
#[must_use]
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

/// Middleware for protected routes: 401 without a valid session, 401 with
/// a distinct message for unverified accounts, otherwise inserts
/// [`CurrentUser`] into request extensions and continues.
pub async fn require_verified_user(
    Extension(service): Extension<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = session_token_from_headers(request.headers());
    let info = service.session_info(token.as_deref()).await;
    let (Some(user), Some(session)) = (info.user, info.session) else {
        return unauthorized("Unauthorized");
    };
    if !user.email_verified {
        return unauthorized("Email not verified");
    }

    request.extensions_mut().insert(CurrentUser { user, session });
    next.run(request).await
}
