//! Password hashing with scrypt.
//!
//! Stored format is `salt:derivedKeyHex` where the salt is 16 random bytes
//! hex-encoded. The hex salt string itself feeds the KDF, so existing
//! hashes stay verifiable across reimplementations.

use rand::{RngCore, rngs::OsRng};
use scrypt::Params;
use subtle::ConstantTimeEq;

const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 64;
// scrypt cost parameters: N=2^14, r=8, p=1.
const LOG_N: u8 = 14;
const R: u32 = 8;
const P: u32 = 1;

/// Failure modes of the hasher.
///
/// A wrong password is NOT an error; `verify_password` returns `Ok(false)`.
/// `Malformed` only arises from corrupted stored data and should surface as
/// a server fault, never as a user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum PasswordHashError {
    #[error("stored password hash is malformed")]
    Malformed,
    #[error("key derivation failed")]
    Kdf,
}

fn params() -> Result<Params, PasswordHashError> {
    Params::new(LOG_N, R, P, KEY_LENGTH).map_err(|_| PasswordHashError::Kdf)
}

/// Hash a password with a fresh random salt.
///
/// # Errors
/// Returns [`PasswordHashError::Kdf`] if key derivation fails.
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| PasswordHashError::Kdf)?;
    let salt_hex = hex::encode(salt);

    let mut derived = [0u8; KEY_LENGTH];
    scrypt::scrypt(password.as_bytes(), salt_hex.as_bytes(), &params()?, &mut derived)
        .map_err(|_| PasswordHashError::Kdf)?;

    Ok(format!("{salt_hex}:{}", hex::encode(derived)))
}

/// Re-derive with the stored salt and compare in constant time.
///
/// # Errors
/// Returns [`PasswordHashError::Malformed`] if `stored` is not
/// `salt:derivedKeyHex`; this indicates corrupted data, not a bad password.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordHashError> {
    let (salt_hex, hash_hex) = stored.split_once(':').ok_or(PasswordHashError::Malformed)?;
    let expected = hex::decode(hash_hex).map_err(|_| PasswordHashError::Malformed)?;
    if expected.len() != KEY_LENGTH {
        return Err(PasswordHashError::Malformed);
    }

    let mut derived = [0u8; KEY_LENGTH];
    scrypt::scrypt(password.as_bytes(), salt_hex.as_bytes(), &params()?, &mut derived)
        .map_err(|_| PasswordHashError::Kdf)?;

    Ok(bool::from(derived.ct_eq(expected.as_slice())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("correct horse battery staple").expect("hash");
        assert_eq!(
            verify_password("correct horse battery staple", &stored).ok(),
            Some(true)
        );
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let stored = hash_password("hunter2").expect("hash");
        assert_eq!(verify_password("hunter3", &stored).ok(), Some(false));
    }

    #[test]
    fn distinct_salts_per_hash() {
        let first = hash_password("same password").expect("hash");
        let second = hash_password("same password").expect("hash");
        assert_ne!(first, second);
        assert_eq!(verify_password("same password", &first).ok(), Some(true));
        assert_eq!(verify_password("same password", &second).ok(), Some(true));
    }

    #[test]
    fn stored_format_is_salt_colon_hex() {
        let stored = hash_password("pw").expect("hash");
        let (salt, hash) = stored.split_once(':').expect("delimiter");
        assert_eq!(salt.len(), SALT_LENGTH * 2);
        assert_eq!(hash.len(), KEY_LENGTH * 2);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn malformed_stored_hash_fails_loudly() {
        assert!(matches!(
            verify_password("pw", "no-delimiter"),
            Err(PasswordHashError::Malformed)
        ));
        assert!(matches!(
            verify_password("pw", "salt:zz-not-hex"),
            Err(PasswordHashError::Malformed)
        ));
        assert!(matches!(
            verify_password("pw", "salt:abcd"),
            Err(PasswordHashError::Malformed)
        ));
    }

    #[test]
    fn empty_password_still_round_trips() {
        let stored = hash_password("").expect("hash");
        assert_eq!(verify_password("", &stored).ok(), Some(true));
        assert_eq!(verify_password("x", &stored).ok(), Some(false));
    }
}
