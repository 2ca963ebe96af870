//! Append-only audit sink. The core only produces events, never reads them
//! back; a failing sink must not fail the request that produced the event.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Login,
    TokenLogin,
    ChangePassword,
}

impl AuditKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::TokenLogin => "TokenLogin",
            Self::ChangePassword => "ChangePassword",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditFlag {
    Normal,
    Warning,
    Error,
}

impl AuditFlag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub title: String,
    pub content: serde_json::Value,
    /// User id the event is about.
    pub author: String,
    pub target: String,
    pub ip: String,
    pub flag: AuditFlag,
}

impl AuditRecord {
    /// Password-login attempt, success or failure.
    #[must_use]
    pub fn login(user_id: &str, device_id: &str, ip: &str, success: bool) -> Self {
        Self::attempt(AuditKind::Login, user_id, device_id, ip, success)
    }

    /// Refresh-token renewal attempt.
    #[must_use]
    pub fn token_login(user_id: &str, device_id: &str, ip: &str, success: bool) -> Self {
        Self::attempt(AuditKind::TokenLogin, user_id, device_id, ip, success)
    }

    #[must_use]
    pub fn change_password(user_id: &str, ip: &str, success: bool) -> Self {
        Self::attempt(AuditKind::ChangePassword, user_id, user_id, ip, success)
    }

    fn attempt(kind: AuditKind, user_id: &str, target: &str, ip: &str, success: bool) -> Self {
        Self {
            kind,
            title: format!("{} {}", kind.as_str(), if success { "ok" } else { "failed" }),
            content: json!({ "success": success }),
            author: user_id.to_string(),
            target: target.to_string(),
            ip: ip.to_string(),
            flag: if success {
                AuditFlag::Normal
            } else {
                AuditFlag::Warning
            },
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

/// Append an event, swallowing sink failures: the audit trail may lag, the
/// security-relevant rows never do.
pub async fn emit<A: AuditSink + ?Sized>(sink: &A, record: AuditRecord) {
    if let Err(err) = sink.record(record).await {
        error!("Failed to append audit record: {err:#}");
    }
}

#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let query = r"
            INSERT INTO audit_log (id, kind, title, content, creation, author, target, ip, flag)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(record.kind.as_str())
            .bind(&record.title)
            .bind(&record.content)
            .bind(Utc::now())
            .bind(&record.author)
            .bind(&record.target)
            .bind(&record.ip)
            .bind(record.flag.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit record")?;
        Ok(())
    }
}
