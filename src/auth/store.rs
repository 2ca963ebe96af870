//! Capability traits for durable auth state, plus the Postgres
//! implementations used in production.
//!
//! The orchestrators only see these traits; all mutations are single
//! statements keyed by primary key, relying on the store's row-level
//! atomicity rather than application-level locking.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

/// One row of the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub password_hash: String,
    /// Permission bitmask.
    pub role: i64,
    /// Status ordinal; see [`super::lockout`].
    pub status: i16,
    /// Consecutive failed password attempts since the last success.
    pub failure_count: i32,
    pub frozen_until: Option<DateTime<Utc>>,
    /// Most recent successful token issuance (informational).
    pub last_refresh: Option<DateTime<Utc>>,
}

/// One row per `(user, device)`: the hash of the currently valid refresh
/// token. A new issuance overwrites the row; there is no history.
#[derive(Debug, Clone)]
pub struct DeviceTokenRecord {
    pub user_id: String,
    pub device_id: String,
    pub hashed_refresh_token: String,
    pub creation: DateTime<Utc>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Whether the user table has been provisioned. Explicit capability, so
    /// first-run detection never rides on a failed query.
    async fn exists(&self) -> Result<bool>;
    /// Create the schema this core needs (users, device tokens, audit log).
    async fn provision(&self) -> Result<()>;
    async fn fetch(&self, id: &str) -> Result<Option<UserRecord>>;
    async fn insert_bootstrap(&self, user: &UserRecord) -> Result<()>;
    /// Persist a failed password attempt: new counter plus the freeze expiry
    /// it produced, in one statement.
    async fn record_failure(
        &self,
        id: &str,
        failure_count: i32,
        frozen_until: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Successful token issuance: reset failures, clear the freeze, stamp
    /// `last_refresh`, in one statement.
    async fn record_success(&self, id: &str, now: DateTime<Utc>) -> Result<()>;
    /// Reset the failure counter without touching `last_refresh` (used by
    /// change-password, which proves the password but issues no tokens).
    async fn reset_failures(&self, id: &str) -> Result<()>;
    async fn update_password(&self, id: &str, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    /// Upsert the row for `(user, device)`; at most one live row per pair.
    async fn upsert(
        &self,
        user_id: &str,
        device_id: &str,
        hashed_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn fetch(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceTokenRecord>>;
    /// Idempotent: deleting a missing row is not an error.
    async fn delete(&self, user_id: &str, device_id: &str) -> Result<()>;
}

const PROVISION_DDL: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL,
        role          BIGINT NOT NULL DEFAULT 0,
        status        SMALLINT NOT NULL DEFAULT 0,
        failure_count INTEGER NOT NULL DEFAULT 0,
        frozen_until  TIMESTAMPTZ,
        last_refresh  TIMESTAMPTZ
    )",
    r"
    CREATE TABLE IF NOT EXISTS device_tokens (
        user_id              TEXT NOT NULL,
        device_id            TEXT NOT NULL,
        hashed_refresh_token TEXT NOT NULL,
        creation             TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (user_id, device_id)
    )",
    r"
    CREATE TABLE IF NOT EXISTS audit_log (
        id       UUID PRIMARY KEY,
        kind     TEXT NOT NULL,
        title    TEXT NOT NULL,
        content  JSONB NOT NULL,
        creation TIMESTAMPTZ NOT NULL,
        author   TEXT NOT NULL,
        target   TEXT NOT NULL,
        ip       TEXT NOT NULL,
        flag     TEXT NOT NULL
    )",
];

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        status: row.try_get("status")?,
        failure_count: row.try_get("failure_count")?,
        frozen_until: row.try_get("frozen_until")?,
        last_refresh: row.try_get("last_refresh")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn exists(&self) -> Result<bool> {
        let query = "SELECT to_regclass('users') IS NOT NULL AS present";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check user table presence")?;
        Ok(row.try_get("present")?)
    }

    async fn provision(&self) -> Result<()> {
        for ddl in PROVISION_DDL {
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "CREATE",
                db.statement = *ddl
            );
            sqlx::query(ddl)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to provision auth schema")?;
        }
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, password_hash, role, status, failure_count, frozen_until, last_refresh
            FROM users WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_bootstrap(&self, user: &UserRecord) -> Result<()> {
        // ON CONFLICT DO NOTHING keeps bootstrap idempotent under races.
        let query = r"
            INSERT INTO users (id, password_hash, role, status, failure_count)
            VALUES ($1, $2, $3, $4, 0)
            ON CONFLICT (id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&user.id)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(user.status)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert bootstrap user")?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &str,
        failure_count: i32,
        frozen_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let query = "UPDATE users SET failure_count = $2, frozen_until = $3 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(failure_count)
            .bind(frozen_until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?;
        Ok(())
    }

    async fn record_success(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE users
            SET failure_count = 0, frozen_until = NULL, last_refresh = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        Ok(())
    }

    async fn reset_failures(&self, id: &str) -> Result<()> {
        let query = "UPDATE users SET failure_count = 0, frozen_until = NULL WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to reset failure counter")?;
        Ok(())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgDeviceTokenStore {
    pool: PgPool,
}

impl PgDeviceTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceTokenStore for PgDeviceTokenStore {
    async fn upsert(
        &self,
        user_id: &str,
        device_id: &str,
        hashed_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO device_tokens (user_id, device_id, hashed_refresh_token, creation)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, device_id)
            DO UPDATE SET hashed_refresh_token = $3, creation = $4
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(device_id)
            .bind(hashed_refresh_token)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to upsert device token")?;
        Ok(())
    }

    async fn fetch(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceTokenRecord>> {
        let query = r"
            SELECT user_id, device_id, hashed_refresh_token, creation
            FROM device_tokens WHERE user_id = $1 AND device_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch device token")?;
        Ok(row.map(|row| DeviceTokenRecord {
            user_id: row.get("user_id"),
            device_id: row.get("device_id"),
            hashed_refresh_token: row.get("hashed_refresh_token"),
            creation: row.get("creation"),
        }))
    }

    async fn delete(&self, user_id: &str, device_id: &str) -> Result<()> {
        let query = "DELETE FROM device_tokens WHERE user_id = $1 AND device_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(device_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete device token")?;
        Ok(())
    }
}
