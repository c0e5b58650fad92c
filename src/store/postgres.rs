//! Postgres-backed session store.
//!
//! A single `auth_records` table keyed by `(email, record_type)` plays the
//! part of the key-value partition. Conditional semantics map onto row
//! counts: `ON CONFLICT DO NOTHING` for the fail-if-exists insert and a
//! token predicate in the `UPDATE .. WHERE` clause for compare-and-swap.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{Instrument, info_span};

use super::memory::now_epoch_seconds;
use super::{
    AuthRecord, BATCH_DELETE_LIMIT, Condition, RecordPatch, SessionStore, StoreError,
};

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS auth_records (
        email TEXT NOT NULL,
        record_type TEXT NOT NULL,
        password_hash TEXT,
        created_at TEXT NOT NULL,
        email_verified BOOLEAN,
        email_verified_token TEXT,
        reset_password_token TEXT,
        time_to_live BIGINT,
        PRIMARY KEY (email, record_type)
    )
";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and make sure the auth table exists.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be established or the schema
    /// statement fails.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create auth_records table")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> AuthRecord {
        AuthRecord {
            email: row.get("email"),
            record_type: row.get("record_type"),
            password_hash: row.get("password_hash"),
            created_at: row.get("created_at"),
            email_verified: row.get("email_verified"),
            email_verified_token: row.get("email_verified_token"),
            reset_password_token: row.get("reset_password_token"),
            time_to_live: row.get("time_to_live"),
        }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn get_record(
        &self,
        email: &str,
        record_type: &str,
    ) -> Result<Option<AuthRecord>, StoreError> {
        // TTL filter here, not in the caller: expired rows must read as absent.
        let query = r"
            SELECT email, record_type, password_hash, created_at,
                   email_verified, email_verified_token, reset_password_token, time_to_live
            FROM auth_records
            WHERE email = $1
              AND record_type = $2
              AND (time_to_live IS NULL OR time_to_live > $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(record_type)
            .bind(now_epoch_seconds())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to get auth record")?;

        Ok(row.map(|row| Self::record_from_row(&row)))
    }

    async fn put_record(
        &self,
        record: &AuthRecord,
        fail_if_exists: bool,
    ) -> Result<(), StoreError> {
        let query = if fail_if_exists {
            r"
                INSERT INTO auth_records
                    (email, record_type, password_hash, created_at,
                     email_verified, email_verified_token, reset_password_token, time_to_live)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (email, record_type) DO NOTHING
            "
        } else {
            r"
                INSERT INTO auth_records
                    (email, record_type, password_hash, created_at,
                     email_verified, email_verified_token, reset_password_token, time_to_live)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (email, record_type) DO UPDATE SET
                    password_hash = EXCLUDED.password_hash,
                    created_at = EXCLUDED.created_at,
                    email_verified = EXCLUDED.email_verified,
                    email_verified_token = EXCLUDED.email_verified_token,
                    reset_password_token = EXCLUDED.reset_password_token,
                    time_to_live = EXCLUDED.time_to_live
            "
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&record.email)
            .bind(&record.record_type)
            .bind(&record.password_hash)
            .bind(&record.created_at)
            .bind(record.email_verified)
            .bind(&record.email_verified_token)
            .bind(&record.reset_password_token)
            .bind(record.time_to_live)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to put auth record")?;

        if fail_if_exists && result.rows_affected() == 0 {
            // The conflict target held an existing row; the race is settled
            // at the store, never by an application-level read-then-write.
            return Err(StoreError::AlreadyExists);
        }
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
            return Err(StoreError::Backend(anyhow!("empty record patch")));
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE auth_records SET ");
        {
            let mut fields = builder.separated(", ");
            if let Some(hash) = patch.password_hash {
                fields.push("password_hash = ");
                fields.push_bind_unseparated(hash);
            }
            if let Some(verified) = patch.email_verified {
                fields.push("email_verified = ");
                fields.push_bind_unseparated(verified);
            }
            if let Some(token) = patch.email_verified_token {
                fields.push("email_verified_token = ");
                fields.push_bind_unseparated(token);
            }
            if let Some(token) = patch.reset_password_token {
                fields.push("reset_password_token = ");
                fields.push_bind_unseparated(token);
            }
        }
        builder.push(" WHERE email = ");
        builder.push_bind(email);
        builder.push(" AND record_type = ");
        builder.push_bind(record_type);
        match condition {
            Condition::Exists => {}
            Condition::EmailVerifiedTokenIs(token) => {
                builder.push(" AND email_verified_token = ");
                builder.push_bind(token);
            }
            Condition::ResetPasswordTokenIs(token) => {
                builder.push(" AND reset_password_token = ");
                builder.push_bind(token);
            }
        }

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = builder.sql()
        );
        let result = builder
            .build()
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update auth record")?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PreconditionFailed);
        }
        Ok(())
    }

    async fn delete_record(&self, email: &str, record_type: &str) -> Result<(), StoreError> {
        // Idempotent; deleting a missing record is fine.
        let query = "DELETE FROM auth_records WHERE email = $1 AND record_type = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(record_type)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete auth record")?;
        Ok(())
    }

    async fn query_records_by_prefix(
        &self,
        email: &str,
        record_type_prefix: &str,
    ) -> Result<Vec<AuthRecord>, StoreError> {
        let query = r"
            SELECT email, record_type, password_hash, created_at,
                   email_verified, email_verified_token, reset_password_token, time_to_live
            FROM auth_records
            WHERE email = $1
              AND record_type LIKE $2 || '%'
              AND (time_to_live IS NULL OR time_to_live > $3)
            ORDER BY record_type
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(email)
            .bind(record_type_prefix)
            .bind(now_epoch_seconds())
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to query auth records by prefix")?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn delete_records(&self, email: &str, record_types: &[String]) -> Result<(), StoreError> {
        let query = "DELETE FROM auth_records WHERE email = $1 AND record_type = ANY($2)";
        for chunk in record_types.chunks(BATCH_DELETE_LIMIT) {
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DELETE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(email)
                .bind(chunk)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to batch-delete auth records")?;
        }
        Ok(())
    }
}
