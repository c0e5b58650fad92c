//! Session token cipher.
//!
//! Tokens are AES-256-GCM ciphertexts of the account email, packed as
//! `nonce || tag || ciphertext` and base64url-encoded so they survive
//! cookies and query strings unescaped. A fresh nonce per call means two
//! tokens for the same email never collide, which is what makes session,
//! verification, and reset tokens independently revocable.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use std::sync::OnceLock;

pub(crate) const NONCE_LENGTH: usize = 12;
pub(crate) const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;

/// Errors from the token cipher.
///
/// Decrypt failures are deliberately collapsed into a single
/// [`TokenError::TokenInvalid`] so callers cannot tell a truncated token
/// from a tampered one.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("session key not set")]
    NotInitialized,
    #[error("session key already set")]
    KeyAlreadySet,
    #[error("session key must be 32 bytes of base64")]
    KeyInvalid,
    #[error("invalid token")]
    TokenInvalid,
    #[error("encryption failure")]
    Crypto,
}

/// Process-wide authenticated encryption for opaque tokens.
///
/// The key is loaded once at startup from the secret store and is read-only
/// afterwards, so concurrent `encrypt`/`decrypt` calls need no locking.
/// Calling either before [`TokenCipher::set_key`] fails with
/// [`TokenError::NotInitialized`]; the surrounding service must finish its
/// async secret fetch before serving requests.
pub struct TokenCipher {
    cipher: OnceLock<Aes256Gcm>,
}

impl TokenCipher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cipher: OnceLock::new(),
        }
    }

    /// Install the 256-bit key (standard base64, as stored in the secret
    /// store).
    ///
    /// # Errors
    /// Returns [`TokenError::KeyInvalid`] for malformed or wrong-length keys
    /// and [`TokenError::KeyAlreadySet`] on a second call.
    pub fn set_key(&self, key_base64: &str) -> Result<(), TokenError> {
        let bytes = STANDARD
            .decode(key_base64.trim())
            .map_err(|_| TokenError::KeyInvalid)?;
        if bytes.len() != KEY_LENGTH {
            return Err(TokenError::KeyInvalid);
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes).map_err(|_| TokenError::KeyInvalid)?;
        self.cipher
            .set(cipher)
            .map_err(|_| TokenError::KeyAlreadySet)
    }

    /// Whether `set_key` has been called.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cipher.get().is_some()
    }

    /// Encrypt an identity string into an opaque, URL-safe token.
    ///
    /// # Errors
    /// Fails with [`TokenError::NotInitialized`] before `set_key`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, TokenError> {
        let cipher = self.cipher.get().ok_or(TokenError::NotInitialized)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|_| TokenError::Crypto)?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        // aes-gcm appends the tag to the ciphertext; repack as nonce||tag||ct.
        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| TokenError::Crypto)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

        let mut packed = Vec::with_capacity(NONCE_LENGTH + TAG_LENGTH + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(tag);
        packed.extend_from_slice(ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(packed))
    }

    /// Decrypt a token back into the identity string.
    ///
    /// # Errors
    /// Any decode, length, or tag failure yields the same
    /// [`TokenError::TokenInvalid`].
    pub fn decrypt(&self, token: &str) -> Result<String, TokenError> {
        let cipher = self.cipher.get().ok_or(TokenError::NotInitialized)?;

        let packed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::TokenInvalid)?;
        if packed.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(TokenError::TokenInvalid);
        }

        let nonce = Nonce::from_slice(&packed[..NONCE_LENGTH]);
        let tag = &packed[NONCE_LENGTH..NONCE_LENGTH + TAG_LENGTH];
        let ciphertext = &packed[NONCE_LENGTH + TAG_LENGTH..];

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LENGTH);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| TokenError::TokenInvalid)?;
        String::from_utf8(plaintext).map_err(|_| TokenError::TokenInvalid)
    }
}

impl Default for TokenCipher {
    fn default() -> Self {
        Self::new()
    }
}
