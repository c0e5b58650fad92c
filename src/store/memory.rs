//! In-memory store for local development and tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::{AuthRecord, Condition, RecordPatch, SessionStore, StoreError};

/// `BTreeMap` keyed by `(email, record_type)`; the ordered keys make the
/// prefix query a plain range scan, mirroring the production store's
/// partition + sort-key layout.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<(String, String), AuthRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expired(record: &AuthRecord) -> bool {
        record
            .time_to_live
            .is_some_and(|ttl| ttl <= now_epoch_seconds())
    }
}

pub(crate) fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn condition_holds(record: &AuthRecord, condition: &Condition) -> bool {
    match condition {
        Condition::Exists => true,
        Condition::EmailVerifiedTokenIs(token) => {
            record.email_verified_token.as_deref() == Some(token.as_str())
        }
        Condition::ResetPasswordTokenIs(token) => {
            record.reset_password_token.as_deref() == Some(token.as_str())
        }
    }
}

fn apply_patch(record: &mut AuthRecord, patch: RecordPatch) {
    if let Some(hash) = patch.password_hash {
        record.password_hash = Some(hash);
    }
    if let Some(verified) = patch.email_verified {
        record.email_verified = Some(verified);
    }
    if let Some(token) = patch.email_verified_token {
        record.email_verified_token = token;
    }
    if let Some(token) = patch.reset_password_token {
        record.reset_password_token = token;
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_record(
        &self,
        email: &str,
        record_type: &str,
    ) -> Result<Option<AuthRecord>, StoreError> {
        let records = self.records.lock().expect("memory store lock");
        let record = records
            .get(&(email.to_string(), record_type.to_string()))
            .filter(|record| !Self::expired(record))
            .cloned();
        Ok(record)
    }

    async fn put_record(
        &self,
        record: &AuthRecord,
        fail_if_exists: bool,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("memory store lock");
        let key = (record.email.clone(), record.record_type.clone());
        if fail_if_exists {
            // An expired leftover does not block re-registration of the key.
            let taken = records.get(&key).is_some_and(|existing| !Self::expired(existing));
            if taken {
                return Err(StoreError::AlreadyExists);
            }
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update_record(
        &self,
        email: &str,
        record_type: &str,
        patch: RecordPatch,
        condition: Condition,
    ) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Backend(anyhow::anyhow!("empty record patch")));
        }
        let mut records = self.records.lock().expect("memory store lock");
        let key = (email.to_string(), record_type.to_string());
        match records.get_mut(&key) {
            Some(record) if !Self::expired(record) && condition_holds(record, &condition) => {
                apply_patch(record, patch);
                Ok(())
            }
            _ => Err(StoreError::PreconditionFailed),
        }
    }

    async fn delete_record(&self, email: &str, record_type: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("memory store lock");
        records.remove(&(email.to_string(), record_type.to_string()));
        Ok(())
    }

    async fn query_records_by_prefix(
        &self,
        email: &str,
        record_type_prefix: &str,
    ) -> Result<Vec<AuthRecord>, StoreError> {
        let records = self.records.lock().expect("memory store lock");
        let matches = records
            .range((email.to_string(), record_type_prefix.to_string())..)
            .take_while(|((key_email, key_type), _)| {
                key_email == email && key_type.starts_with(record_type_prefix)
            })
            .map(|(_, record)| record)
            .filter(|record| !Self::expired(record))
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn delete_records(&self, email: &str, record_types: &[String]) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("memory store lock");
        for record_type in record_types {
            records.remove(&(email.to_string(), record_type.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{USER_RECORD, session_record_type};

    fn user(email: &str) -> AuthRecord {
        AuthRecord::user(
            email,
            "salt:hash".to_string(),
            "verify".to_string(),
            "2026-01-01T00:00:00.000Z".to_string(),
        )
    }

    #[tokio::test]
    async fn put_fail_if_exists_rejects_duplicates() {
        let store = MemoryStore::new();
        store.put_record(&user("a@b.co"), true).await.expect("first");
        let second = store.put_record(&user("a@b.co"), true).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists)));
        // Unconditional put is an upsert.
        store.put_record(&user("a@b.co"), false).await.expect("upsert");
    }

    #[tokio::test]
    async fn conditional_update_is_single_use() {
        let store = MemoryStore::new();
        store.put_record(&user("a@b.co"), true).await.expect("put");

        let patch = RecordPatch {
            email_verified: Some(true),
            email_verified_token: Some(None),
            ..RecordPatch::default()
        };
        store
            .update_record(
                "a@b.co",
                USER_RECORD,
                patch.clone(),
                Condition::EmailVerifiedTokenIs("verify".to_string()),
            )
            .await
            .expect("first use");

        // The token was cleared, so the same link no longer matches.
        let replay = store
            .update_record(
                "a@b.co",
                USER_RECORD,
                patch,
                Condition::EmailVerifiedTokenIs("verify".to_string()),
            )
            .await;
        assert!(matches!(replay, Err(StoreError::PreconditionFailed)));
    }

    #[tokio::test]
    async fn update_missing_record_fails_precondition() {
        let store = MemoryStore::new();
        let result = store
            .update_record(
                "ghost@b.co",
                USER_RECORD,
                RecordPatch {
                    reset_password_token: Some(Some("t".to_string())),
                    ..RecordPatch::default()
                },
                Condition::Exists,
            )
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed)));
    }

    #[tokio::test]
    async fn prefix_query_lists_only_this_users_sessions() {
        let store = MemoryStore::new();
        let now = now_epoch_seconds();
        for token in ["t1", "t2", "t3"] {
            let session = AuthRecord::session("a@b.co", token, String::new(), now + 60);
            store.put_record(&session, false).await.expect("put");
        }
        let other = AuthRecord::session("z@b.co", "t9", String::new(), now + 60);
        store.put_record(&other, false).await.expect("put");
        store.put_record(&user("a@b.co"), true).await.expect("put user");

        let sessions = store
            .query_records_by_prefix("a@b.co", crate::store::SESSION_PREFIX)
            .await
            .expect("query");
        assert_eq!(sessions.len(), 3);
        assert!(sessions.iter().all(|r| r.email == "a@b.co"));
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() {
        let store = MemoryStore::new();
        let stale = AuthRecord::session("a@b.co", "old", String::new(), now_epoch_seconds() - 1);
        store.put_record(&stale, false).await.expect("put");

        let record_type = session_record_type("old");
        assert!(store
            .get_record("a@b.co", &record_type)
            .await
            .expect("get")
            .is_none());
        assert!(store
            .query_records_by_prefix("a@b.co", crate::store::SESSION_PREFIX)
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn delete_records_removes_all_named() {
        let store = MemoryStore::new();
        let now = now_epoch_seconds();
        let mut record_types = Vec::new();
        for token in ["t1", "t2", "t3"] {
            let session = AuthRecord::session("a@b.co", token, String::new(), now + 60);
            store.put_record(&session, false).await.expect("put");
            record_types.push(session.record_type);
        }
        store
            .delete_records("a@b.co", &record_types)
            .await
            .expect("delete");
        let remaining = store
            .query_records_by_prefix("a@b.co", crate::store::SESSION_PREFIX)
            .await
            .expect("query");
        assert!(remaining.is_empty());
    }
}
