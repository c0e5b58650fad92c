use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query},
    http::{
        StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{AppendHeaders, IntoResponse, Response},
};
use serde_json::json;

use crate::api::handlers::auth::types::VerifyEmailParams;
use crate::api::handlers::auth::{error_response, redirect_found, session_cookie_value};
use crate::auth::{AuthError, AuthService};

/// Landing endpoint for the emailed verification link. A valid token marks
/// the account verified and logs the user in; a stale or wrong token (for
/// example a second click) lands on the frontend error page instead.
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    params(VerifyEmailParams),
    responses(
        (status = 302, description = "Verified and logged in, redirect to /"),
        (status = 400, description = "Missing email or token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    Extension(service): Extension<Arc<AuthService>>,
    Query(params): Query<VerifyEmailParams>,
) -> Response {
    let (Some(email), Some(token)) = (params.email, params.token) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email and token are required" })),
        )
            .into_response();
    };

    match service.verify_email(&email, &token).await {
        Ok(session_token) => {
            let cookie = session_cookie_value(service.config(), &session_token);
            (
                StatusCode::FOUND,
                AppendHeaders([(LOCATION, "/".to_string()), (SET_COOKIE, cookie)]),
            )
                .into_response()
        }
        Err(AuthError::PreconditionFailed | AuthError::TokenInvalid) => redirect_found("/error"),
        Err(err) => error_response(&err),
    }
}
