//! Durable key-value storage for user and session records.
//!
//! One partition per email holds a single `USER` record and any number of
//! `SESSION#<token>` records, so a prefix query over the record type lists
//! every active login for an account. Conditional writes are the only
//! concurrency guard in the system: duplicate signups race at
//! `put_record(fail_if_exists)` and stale verification/reset links are
//! rejected by `update_record`'s token predicate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Record type of the one-per-identity user record.
pub const USER_RECORD: &str = "USER";

/// Record type prefix shared by all session records.
pub const SESSION_PREFIX: &str = "SESSION#";

/// Batch deletes are chunked to the store's batch-write limit.
pub(crate) const BATCH_DELETE_LIMIT: usize = 25;

/// Record type for one session, addressable by its token.
#[must_use]
pub fn session_record_type(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

/// A row in the auth partition; both user and session records share this
/// shape, discriminated by `record_type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub email: String,
    pub record_type: String,
    pub password_hash: Option<String>,
    pub created_at: String,
    pub email_verified: Option<bool>,
    pub email_verified_token: Option<String>,
    pub reset_password_token: Option<String>,
    /// Epoch seconds; records past this time are treated as absent even if
    /// not yet physically purged.
    pub time_to_live: Option<i64>,
}

impl AuthRecord {
    /// Fresh user record as written at signup.
    #[must_use]
    pub fn user(email: &str, password_hash: String, verify_token: String, created_at: String) -> Self {
        Self {
            email: email.to_string(),
            record_type: USER_RECORD.to_string(),
            password_hash: Some(password_hash),
            created_at,
            email_verified: Some(false),
            email_verified_token: Some(verify_token),
            reset_password_token: None,
            time_to_live: None,
        }
    }

    /// Session record for one login, expiring at `time_to_live`.
    #[must_use]
    pub fn session(email: &str, token: &str, created_at: String, time_to_live: i64) -> Self {
        Self {
            email: email.to_string(),
            record_type: session_record_type(token),
            password_hash: None,
            created_at,
            email_verified: None,
            email_verified_token: None,
            reset_password_token: None,
            time_to_live: Some(time_to_live),
        }
    }
}

/// Partial update applied by [`SessionStore::update_record`].
///
/// The nested `Option` on token fields distinguishes "leave untouched"
/// (`None`) from "clear to null" (`Some(None)`).
#[derive(Clone, Debug, Default)]
pub struct RecordPatch {
    pub password_hash: Option<String>,
    pub email_verified: Option<bool>,
    pub email_verified_token: Option<Option<String>>,
    pub reset_password_token: Option<Option<String>>,
}

impl RecordPatch {
    pub(crate) fn is_empty(&self) -> bool {
        self.password_hash.is_none()
            && self.email_verified.is_none()
            && self.email_verified_token.is_none()
            && self.reset_password_token.is_none()
    }
}

/// Predicate an update must satisfy atomically, or fail with
/// [`StoreError::PreconditionFailed`]. This is what prevents replaying a
/// stale verification or reset link.
#[derive(Clone, Debug)]
pub enum Condition {
    /// The record must exist; no further constraint.
    Exists,
    /// Stored `email_verified_token` must equal the given value.
    EmailVerifiedTokenIs(String),
    /// Stored `reset_password_token` must equal the given value.
    ResetPasswordTokenIs(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Conditional insert lost the race; the record already exists.
    #[error("record already exists")]
    AlreadyExists,
    /// The update's condition did not hold.
    #[error("condition not satisfied")]
    PreconditionFailed,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Narrow contract over the key-value store, as consumed by the auth
/// service. All operations are keyed by `(email, record_type)`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch one record; expired records read as `None`.
    async fn get_record(
        &self,
        email: &str,
        record_type: &str,
    ) -> Result<Option<AuthRecord>, StoreError>;

    /// Insert or replace a record. With `fail_if_exists` the write is a
    /// store-level conditional insert and fails with
    /// [`StoreError::AlreadyExists`] if the key is taken.
    async fn put_record(&self, record: &AuthRecord, fail_if_exists: bool)
        -> Result<(), StoreError>;

    /// Apply a patch if `condition` holds, atomically.
    async fn update_record(
        &self,
        email: &str,
        record_type: &str,
        patch: RecordPatch,
        condition: Condition,
    ) -> Result<(), StoreError>;

    /// Delete one record; deleting a missing record is not an error.
    async fn delete_record(&self, email: &str, record_type: &str) -> Result<(), StoreError>;

    /// List unexpired records whose type starts with `record_type_prefix`.
    async fn query_records_by_prefix(
        &self,
        email: &str,
        record_type_prefix: &str,
    ) -> Result<Vec<AuthRecord>, StoreError>;

    /// Delete many records, chunked to the store's batch-write limit.
    async fn delete_records(&self, email: &str, record_types: &[String]) -> Result<(), StoreError>;
}
