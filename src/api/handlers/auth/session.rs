use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde_json::json;

use crate::api::handlers::auth::{clear_session_cookie_value, error_response};
use crate::auth::middleware::session_token_from_headers;
use crate::auth::{AuthService, SessionInfo};

/// Session introspection for the frontend's "who am I" check. Anonymous
/// callers get `{user: null, session: null}`, never an error.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Current user and session, or nulls", body = SessionInfo)
    ),
    tag = "auth"
)]
pub async fn session(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Json<SessionInfo> {
    let token = session_token_from_headers(&headers);
    Json(service.session_info(token.as_deref()).await)
}

/// End the session named by the cookie. The cookie is cleared even when
/// there was nothing to delete.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Session ended, cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    let token = session_token_from_headers(&headers);
    if let Err(err) = service.logout(token.as_deref()).await {
        return error_response(&err);
    }
    let cookie = clear_session_cookie_value(service.config());
    (AppendHeaders([(SET_COOKIE, cookie)]), Json(json!({}))).into_response()
}

/// End every session for the account behind the cookie, signing out all
/// devices at once.
#[utoipa::path(
    post,
    path = "/auth/logout/all",
    responses(
        (status = 200, description = "All sessions ended, cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout_all(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = session_token_from_headers(&headers) {
        if let Err(err) = service.logout_all(&token).await {
            return error_response(&err);
        }
    }
    let cookie = clear_session_cookie_value(service.config());
    (AppendHeaders([(SET_COOKIE, cookie)]), Json(json!({}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, SESSION_COOKIE_NAME, TokenCipher};
    use crate::email::LogMailer;
    use crate::store::MemoryStore;
    use axum::http::{HeaderValue, StatusCode, header::COOKIE};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn service() -> Arc<AuthService> {
        let cipher = Arc::new(TokenCipher::new());
        cipher.set_key(&STANDARD.encode([7u8; 32])).expect("key");
        Arc::new(AuthService::new(
            Arc::new(MemoryStore::new()),
            cipher,
            Arc::new(LogMailer),
            AuthConfig::new("http://localhost:3000".to_string()),
        ))
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("{SESSION_COOKIE_NAME}={token}");
        headers.insert(COOKIE, HeaderValue::from_str(&value).expect("cookie"));
        headers
    }

    #[tokio::test]
    async fn anonymous_session_is_nulls() {
        let Json(info) = session(Extension(service()), HeaderMap::new()).await;
        assert!(info.user.is_none());
        assert!(info.session.is_none());
    }

    #[tokio::test]
    async fn logout_clears_the_cookie_without_one() {
        let response = logout(Extension(service()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("cookie");
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn logout_all_revokes_every_session() {
        let service = service();
        service.signup("a@b.co", "pw", "pw").await.expect("signup");
        let first = service.login("a@b.co", "pw").await.expect("login");
        let second = service.login("a@b.co", "pw").await.expect("login");

        let response = logout_all(Extension(service.clone()), cookie_headers(&first)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(service.session_info(Some(&first)).await.user.is_none());
        assert!(service.session_info(Some(&second)).await.user.is_none());
    }
}
