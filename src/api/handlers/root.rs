use axum::{Json, response::IntoResponse};
use serde_json::json;

/// Undocumented root endpoint; handy for smoke checks.
pub async fn root() -> impl IntoResponse {
    Json(json!({ "message": "parola" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn root_answers() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
