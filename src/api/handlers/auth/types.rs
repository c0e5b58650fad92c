//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionTokenResponse {
    #[serde(rename = "sessionToken")]
    pub session_token: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct VerifyEmailParams {
    pub email: Option<String>,
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(IntoParams, Deserialize, Debug)]
pub struct ResetPasswordParams {
    pub email: Option<String>,
    pub token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}
