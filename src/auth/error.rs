//! Error taxonomy for the auth service.
//!
//! Cryptographic and store failures are translated here at the service
//! boundary; handlers map each variant to a status code and a deliberately
//! vague message where enumeration resistance demands it.

use crate::auth::password::PasswordHashError;
use crate::auth::token::TokenError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input: empty fields or a password/confirmation mismatch.
    #[error("{0}")]
    Validation(String),
    /// Unknown email or wrong password; intentionally indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Duplicate signup, settled by the store's conditional insert.
    #[error("Email already registered")]
    AlreadyExists,
    /// Stale or invalid verification/reset token.
    #[error("Invalid or expired link")]
    PreconditionFailed,
    /// Cipher used before its key was installed; a startup-ordering bug.
    #[error("session cipher not initialized")]
    NotInitialized,
    /// Tampered, truncated, or wrong-key token.
    #[error("invalid token")]
    TokenInvalid,
    #[error("Unauthorized")]
    Unauthorized,
    /// Anything unexpected (store unreachable, corrupted record).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyExists,
            StoreError::PreconditionFailed => Self::PreconditionFailed,
            StoreError::Backend(err) => Self::Internal(err),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotInitialized => Self::NotInitialized,
            TokenError::TokenInvalid => Self::TokenInvalid,
            TokenError::KeyInvalid | TokenError::KeyAlreadySet | TokenError::Crypto => {
                Self::Internal(anyhow::anyhow!(err))
            }
        }
    }
}

impl From<PasswordHashError> for AuthError {
    fn from(err: PasswordHashError) -> Self {
        // Malformed stored hashes are corrupted data; fail loudly as 500s.
        Self::Internal(anyhow::anyhow!(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_translate() {
        assert!(matches!(
            AuthError::from(StoreError::AlreadyExists),
            AuthError::AlreadyExists
        ));
        assert!(matches!(
            AuthError::from(StoreError::PreconditionFailed),
            AuthError::PreconditionFailed
        ));
    }

    #[test]
    fn token_errors_translate() {
        assert!(matches!(
            AuthError::from(TokenError::NotInitialized),
            AuthError::NotInitialized
        ));
        assert!(matches!(
            AuthError::from(TokenError::TokenInvalid),
            AuthError::TokenInvalid
        ));
        assert!(matches!(
            AuthError::from(TokenError::KeyInvalid),
            AuthError::Internal(_)
        ));
    }

    #[test]
    fn credential_errors_share_a_message() {
        // Unknown email and wrong password must read identically.
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
    }
}
