use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Response},
};

use crate::api::handlers::auth::types::{SessionTokenResponse, SignupRequest};
use crate::api::handlers::auth::{error_response, session_cookie_value};
use crate::auth::AuthService;

/// Register a new account. The user is logged in immediately; email
/// verification happens out of band.
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created, session started", body = SessionTokenResponse),
        (status = 400, description = "Invalid input or email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    Extension(service): Extension<Arc<AuthService>>,
    Json(payload): Json<SignupRequest>,
) -> Response {
    match service
        .signup(&payload.email, &payload.password, &payload.confirm_password)
        .await
    {
        Ok(token) => {
            let cookie = session_cookie_value(service.config(), &token);
            (
                AppendHeaders([(SET_COOKIE, cookie)]),
                Json(SessionTokenResponse {
                    session_token: token,
                }),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, SESSION_COOKIE_NAME, TokenCipher};
    use crate::email::LogMailer;
    use crate::store::MemoryStore;
    use axum::http::StatusCode;
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

    #[tokio::test]
    async fn signup_sets_the_session_cookie() {
        let response = signup(
            Extension(service()),
            Json(SignupRequest {
                email: "a@b.co".to_string(),
                password: "pw".to_string(),
                confirm_password: "pw".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("cookie");
        assert!(cookie.starts_with(SESSION_COOKIE_NAME));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn mismatched_passwords_are_rejected() {
        let response = signup(
            Extension(service()),
            Json(SignupRequest {
                email: "a@b.co".to_string(),
                password: "one".to_string(),
                confirm_password: "two".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
