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
use url::form_urlencoded;

use crate::api::handlers::auth::types::{
    ForgotPasswordRequest, ResetPasswordParams, ResetPasswordRequest,
};
use crate::api::handlers::auth::{clear_session_cookie_value, error_response, redirect_found};
use crate::auth::AuthService;

/// Request a password-reset email. Always answers 200 so responses cannot
/// be used to probe which emails are registered.
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Acknowledged regardless of outcome")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(service): Extension<Arc<AuthService>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Response {
    service.forgot_password(&payload.email).await;
    Json(json!({})).into_response()
}

/// Landing endpoint for the emailed reset link: forwards valid tokens to
/// the frontend reset form without consuming them, so the form can still
/// submit the token later.
#[utoipa::path(
    get,
    path = "/auth/reset-password",
    params(ResetPasswordParams),
    responses(
        (status = 302, description = "Redirect to the reset form or the error page")
    ),
    tag = "auth"
)]
pub async fn reset_password_landing(
    Extension(service): Extension<Arc<AuthService>>,
    Query(params): Query<ResetPasswordParams>,
) -> Response {
    let (Some(email), Some(token)) = (params.email, params.token) else {
        return redirect_found("/error");
    };
    if !service.reset_token_matches(&email, &token).await {
        return redirect_found("/error");
    }

    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("email", &email)
        .append_pair("token", &token)
        .finish();
    redirect_found(&format!("/reset-password?{query}"))
}

/// Submit a new password. On success every session for the account is
/// revoked and the browser is sent to the login page.
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 302, description = "Password changed, redirect to /login"),
        (status = 400, description = "Invalid input or stale token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Extension(service): Extension<Arc<AuthService>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Response {
    match service
        .reset_password(
            &payload.email,
            &payload.token,
            &payload.password,
            &payload.confirm_password,
        )
        .await
    {
        Ok(()) => {
            let cookie = clear_session_cookie_value(service.config());
            (
                StatusCode::FOUND,
                AppendHeaders([(LOCATION, "/login".to_string()), (SET_COOKIE, cookie)]),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}
