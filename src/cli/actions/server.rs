use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use tracing::info;

use crate::api;
use crate::auth::{AuthConfig, AuthService, TokenCipher};
use crate::cli::actions::Action;
use crate::email::LogMailer;
use crate::store::PgStore;

/// Wire up the store, cipher, and mailer, then start the HTTP server.
/// # Errors
/// Returns an error if the database is unreachable, the session key is not
/// a valid base64 256-bit key, or the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        base_url,
        session_key,
    } = action;

    let store = PgStore::connect(&dsn)
        .await
        .context("Failed to connect to the database")?;

    // The key is injected exactly once for the lifetime of the process.
    let cipher = TokenCipher::new();
    cipher
        .set_key(session_key.expose_secret())
        .context("Invalid session key")?;

    let config = AuthConfig::new(base_url);
    let service = AuthService::new(
        Arc::new(store),
        Arc::new(cipher),
        Arc::new(LogMailer),
        config,
    );

    info!(port, "Starting parola");

    api::new(port, Arc::new(service)).await
}
