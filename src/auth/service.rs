//! Auth service: signup, login, logout, verification, and password reset.
//!
//! One constructed object holds the store, the token cipher, the mailer,
//! and configuration; handlers receive it via an axum `Extension`. No
//! in-process lock is held across a store call: the store's conditional
//! writes are the only concurrency guard, so two concurrent logins simply
//! produce two independently revocable sessions.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::auth::error::AuthError;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::token::TokenCipher;
use crate::auth::AuthConfig;
use crate::email::{reset_password_email, verification_email, Mailer};
use crate::store::{
    session_record_type, AuthRecord, Condition, RecordPatch, SessionStore, SESSION_PREFIX,
    USER_RECORD,
};

/// User fields safe to cross the trust boundary. The password hash and the
/// verification/reset tokens never leave the service.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "emailVerified")]
    pub email_verified: bool,
}

/// One active login.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// Result of session introspection; `(None, None)` means anonymous.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    pub user: Option<UserView>,
    pub session: Option<SessionView>,
}

pub struct AuthService {
    store: Arc<dyn SessionStore>,
    cipher: Arc<TokenCipher>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        cipher: Arc<TokenCipher>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            cipher,
            mailer,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn now_iso() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn session_expiry(&self) -> i64 {
        Utc::now().timestamp() + self.config.session_ttl_seconds()
    }

    /// Encrypt a fresh session token and persist its record.
    async fn create_session(&self, email: &str) -> Result<String, AuthError> {
        let token = self.cipher.encrypt(email)?;
        let record = AuthRecord::session(email, &token, Self::now_iso(), self.session_expiry());
        self.store.put_record(&record, false).await?;
        Ok(token)
    }

    fn validate_passwords(password: &str, confirm_password: &str) -> Result<(), AuthError> {
        if password.is_empty() || confirm_password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        if password != confirm_password {
            return Err(AuthError::Validation("Passwords do not match".to_string()));
        }
        Ok(())
    }

    /// Register a new account, send the verification email, and log the
    /// user straight in.
    ///
    /// # Errors
    /// `Validation` on empty/mismatched input, `AlreadyExists` when the
    /// email is taken (settled by the store's conditional insert).
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<String, AuthError> {
        if email.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        Self::validate_passwords(password, confirm_password)?;

        let password_hash = hash_password(password)?;
        let verify_token = self.cipher.encrypt(email)?;
        let user = AuthRecord::user(email, password_hash, verify_token.clone(), Self::now_iso());
        self.store.put_record(&user, true).await?;

        // The account and its session are durable at this point; a failed
        // send is logged, not surfaced.
        let message = verification_email(self.config.base_url(), email, &verify_token);
        if let Err(err) = self.mailer.send(&message) {
            error!("failed to send verification email: {err}");
        }

        self.create_session(email).await
    }

    /// Consume a verification link: mark the account verified and clear the
    /// token in one conditional update, then create a session (a click on
    /// the emailed link doubles as a login).
    ///
    /// # Errors
    /// `PreconditionFailed` when the token does not match the stored one or
    /// the user does not exist; a second click therefore safely no-ops.
    pub async fn verify_email(&self, email: &str, token: &str) -> Result<String, AuthError> {
        let patch = RecordPatch {
            email_verified: Some(true),
            email_verified_token: Some(None),
            ..RecordPatch::default()
        };
        self.store
            .update_record(
                email,
                USER_RECORD,
                patch,
                Condition::EmailVerifiedTokenIs(token.to_string()),
            )
            .await?;

        self.create_session(email).await
    }

    /// Authenticate with email and password, producing a new session.
    ///
    /// # Errors
    /// `InvalidCredentials` for both unknown email and wrong password, so
    /// responses cannot be used to enumerate accounts.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let Some(user) = self.store.get_record(email, USER_RECORD).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        let Some(stored_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Internal(anyhow::anyhow!(
                "user record missing password hash"
            )));
        };
        if !verify_password(password, stored_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.create_session(email).await
    }

    /// Delete the single session named by the cookie token. A missing or
    /// undecryptable token is a no-op, not an error; the handler clears the
    /// cookie either way.
    pub async fn logout(&self, session_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = session_token else {
            return Ok(());
        };
        let Ok(email) = self.cipher.decrypt(token) else {
            return Ok(());
        };
        self.store
            .delete_record(&email, &session_record_type(token))
            .await?;
        Ok(())
    }

    /// Revoke every session for the identity behind the cookie token.
    pub async fn logout_all(&self, session_token: &str) -> Result<(), AuthError> {
        let Ok(email) = self.cipher.decrypt(session_token) else {
            return Ok(());
        };
        self.revoke_all_sessions(&email).await
    }

    async fn revoke_all_sessions(&self, email: &str) -> Result<(), AuthError> {
        let sessions = self
            .store
            .query_records_by_prefix(email, SESSION_PREFIX)
            .await?;
        let record_types: Vec<String> = sessions
            .into_iter()
            .map(|record| record.record_type)
            .collect();
        if !record_types.is_empty() {
            self.store.delete_records(email, &record_types).await?;
        }
        Ok(())
    }

    /// Set a reset token and send the reset email. Always reports success:
    /// unknown emails and internal failures are indistinguishable to the
    /// caller, by design.
    pub async fn forgot_password(&self, email: &str) {
        if let Err(err) = self.forgot_password_inner(email).await {
            warn!("forgot-password for {email} not completed: {err}");
        }
    }

    async fn forgot_password_inner(&self, email: &str) -> Result<(), AuthError> {
        let reset_token = self.cipher.encrypt(email)?;
        // A new request overwrites any prior token; only the latest link works.
        let patch = RecordPatch {
            reset_password_token: Some(Some(reset_token.clone())),
            ..RecordPatch::default()
        };
        self.store
            .update_record(email, USER_RECORD, patch, Condition::Exists)
            .await?;

        let message = reset_password_email(self.config.base_url(), email, &reset_token);
        self.mailer
            .send(&message)
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    /// Non-consuming check used by the reset-link landing page.
    pub async fn reset_token_matches(&self, email: &str, token: &str) -> bool {
        match self.store.get_record(email, USER_RECORD).await {
            Ok(Some(user)) => user
                .reset_password_token
                .as_deref()
                .is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(token.as_bytes()))),
            Ok(None) => false,
            Err(err) => {
                error!("failed to check reset token: {err}");
                false
            }
        }
    }

    /// Complete a password reset: swap the hash and clear the token in one
    /// conditional update, then revoke every session for the account so the
    /// new password is required everywhere.
    ///
    /// # Errors
    /// `Validation` on mismatched input, `PreconditionFailed` when the
    /// token is stale (already used or superseded).
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if email.is_empty() || token.is_empty() {
            return Err(AuthError::Validation(
                "Email and token are required".to_string(),
            ));
        }
        Self::validate_passwords(password, confirm_password)?;

        let password_hash = hash_password(password)?;
        let patch = RecordPatch {
            password_hash: Some(password_hash),
            reset_password_token: Some(None),
            ..RecordPatch::default()
        };
        self.store
            .update_record(
                email,
                USER_RECORD,
                patch,
                Condition::ResetPasswordTokenIs(token.to_string()),
            )
            .await?;

        self.revoke_all_sessions(email).await
    }

    /// Resolve a cookie token to the user and session behind it.
    ///
    /// Deliberately fail-open-to-anonymous: missing cookie, bad token,
    /// missing records, and store errors all read as `(None, None)`. This
    /// backs the "who am I" check on every page load.
    pub async fn session_info(&self, session_token: Option<&str>) -> SessionInfo {
        let Some(token) = session_token else {
            return SessionInfo::default();
        };
        let Ok(email) = self.cipher.decrypt(token) else {
            return SessionInfo::default();
        };

        let record_type = session_record_type(token);
        let (user, session) = tokio::join!(
            self.store.get_record(&email, USER_RECORD),
            self.store.get_record(&email, &record_type),
        );
        match (user, session) {
            (Ok(Some(user)), Ok(Some(session))) => SessionInfo {
                user: Some(UserView {
                    email: user.email,
                    created_at: user.created_at,
                    email_verified: user.email_verified.unwrap_or(false),
                }),
                session: Some(SessionView {
                    email: session.email,
                    created_at: session.created_at,
                }),
            },
            (Ok(_), Ok(_)) => SessionInfo::default(),
            (user, session) => {
                for err in [user.err(), session.err()].into_iter().flatten() {
                    error!("session lookup failed: {err}");
                }
                SessionInfo::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailMessage;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    struct NullMailer;

    impl Mailer for NullMailer {
        fn send(&self, _message: &EmailMessage) -> Result<()> {
            Ok(())
        }
    }

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let cipher = Arc::new(TokenCipher::new());
        cipher.set_key(&STANDARD.encode([3u8; 32])).expect("key");
        let service = AuthService::new(
            store.clone(),
            cipher,
            Arc::new(NullMailer),
            AuthConfig::new("http://localhost:3000".to_string()),
        );
        (service, store)
    }

    #[tokio::test]
    async fn signup_rejects_mismatched_passwords() {
        let (service, _) = service();
        let result = service.signup("a@b.co", "one", "two").await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn signup_rejects_empty_input() {
        let (service, _) = service();
        assert!(matches!(
            service.signup("", "pw", "pw").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            service.signup("a@b.co", "", "").await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_signup_is_already_exists() {
        let (service, _) = service();
        service.signup("a@b.co", "pw", "pw").await.expect("first");
        let second = service.signup("a@b.co", "pw", "pw").await;
        assert!(matches!(second, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn login_is_enumeration_resistant() {
        let (service, _) = service();
        service.signup("a@b.co", "pw", "pw").await.expect("signup");

        let unknown = service.login("ghost@b.co", "pw").await;
        let wrong = service.login("a@b.co", "nope").await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn session_info_requires_record_and_decryption() {
        let (service, store) = service();
        let token = service.signup("a@b.co", "pw", "pw").await.expect("signup");

        let info = service.session_info(Some(&token)).await;
        assert_eq!(info.user.as_ref().map(|u| u.email_verified), Some(false));
        assert!(info.session.is_some());

        // Valid ciphertext but no session record: still anonymous.
        store
            .delete_record("a@b.co", &session_record_type(&token))
            .await
            .expect("delete");
        let info = service.session_info(Some(&token)).await;
        assert!(info.user.is_none());
        assert!(info.session.is_none());

        let info = service.session_info(Some("garbage")).await;
        assert!(info.user.is_none());
        let info = service.session_info(None).await;
        assert!(info.user.is_none());
    }

    #[tokio::test]
    async fn logout_removes_only_that_session() {
        let (service, _) = service();
        service.signup("a@b.co", "pw", "pw").await.expect("signup");
        let first = service.login("a@b.co", "pw").await.expect("login");
        let second = service.login("a@b.co", "pw").await.expect("login");

        service.logout(Some(&first)).await.expect("logout");
        assert!(service.session_info(Some(&first)).await.user.is_none());
        assert!(service.session_info(Some(&second)).await.user.is_some());

        // No cookie and garbage cookies are quiet no-ops.
        service.logout(None).await.expect("noop");
        service.logout(Some("garbage")).await.expect("noop");
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_emails() {
        let (service, store) = service();
        service.forgot_password("ghost@b.co").await;
        assert!(store
            .get_record("ghost@b.co", USER_RECORD)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn new_reset_request_supersedes_the_old_token() {
        let (service, store) = service();
        service.signup("a@b.co", "pw", "pw").await.expect("signup");

        service.forgot_password("a@b.co").await;
        let first = store
            .get_record("a@b.co", USER_RECORD)
            .await
            .expect("get")
            .and_then(|u| u.reset_password_token)
            .expect("token");

        service.forgot_password("a@b.co").await;
        assert!(!service.reset_token_matches("a@b.co", &first).await);
    }
}
