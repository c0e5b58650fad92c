use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse, Response},
};

use crate::api::handlers::auth::types::{LoginRequest, SessionTokenResponse};
use crate::api::handlers::auth::{error_response, session_cookie_value};
use crate::auth::AuthService;

/// Authenticate and start a new session. Each login creates an independent
/// session, so multiple devices can stay signed in at once.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = SessionTokenResponse),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    Json(payload): Json<LoginRequest>,
) -> Response {
    match service.login(&payload.email, &payload.password).await {
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
