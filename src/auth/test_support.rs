//! In-memory store doubles for orchestrator tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use super::{
    audit::{AuditFlag, AuditKind, AuditRecord, AuditSink},
    login::LoginRequest,
    store::{DeviceTokenRecord, DeviceTokenStore, UserRecord, UserStore},
    token::TokenIssuer,
    AuthConfig,
};

#[derive(Default)]
pub(crate) struct MemoryUserStore {
    users: Mutex<HashMap<String, UserRecord>>,
    provisioned: Mutex<bool>,
    provision_calls: Mutex<u32>,
}

impl MemoryUserStore {
    pub(crate) fn user_count(&self) -> usize {
        self.users.lock().expect("lock").len()
    }

    pub(crate) fn provision_calls(&self) -> u32 {
        *self.provision_calls.lock().expect("lock")
    }

    pub(crate) fn failure_count(&self, id: &str) -> i32 {
        self.users.lock().expect("lock")[id].failure_count
    }

    pub(crate) fn frozen_until(&self, id: &str) -> Option<DateTime<Utc>> {
        self.users.lock().expect("lock")[id].frozen_until
    }

    /// Clear the freeze while keeping the failure counter.
    pub(crate) fn thaw(&self, id: &str) {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.frozen_until = None;
        }
    }

    pub(crate) fn freeze(&self, id: &str, until: DateTime<Utc>) {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.frozen_until = Some(until);
        }
    }

    pub(crate) fn set_status(&self, id: &str, status: i16) {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.status = status;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn exists(&self) -> Result<bool> {
        Ok(*self.provisioned.lock().expect("lock"))
    }

    async fn provision(&self) -> Result<()> {
        *self.provisioned.lock().expect("lock") = true;
        *self.provision_calls.lock().expect("lock") += 1;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.lock().expect("lock").get(id).cloned())
    }

    async fn insert_bootstrap(&self, user: &UserRecord) -> Result<()> {
        self.users
            .lock()
            .expect("lock")
            .entry(user.id.clone())
            .or_insert_with(|| user.clone());
        Ok(())
    }

    async fn record_failure(
        &self,
        id: &str,
        failure_count: i32,
        frozen_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.failure_count = failure_count;
            user.frozen_until = frozen_until;
        }
        Ok(())
    }

    async fn record_success(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.failure_count = 0;
            user.frozen_until = None;
            user.last_refresh = Some(now);
        }
        Ok(())
    }

    async fn reset_failures(&self, id: &str) -> Result<()> {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.failure_count = 0;
            user.frozen_until = None;
        }
        Ok(())
    }

    async fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        if let Some(user) = self.users.lock().expect("lock").get_mut(id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryDeviceStore {
    rows: Mutex<HashMap<(String, String), DeviceTokenRecord>>,
}

impl MemoryDeviceStore {
    pub(crate) fn has_row(&self, user_id: &str, device_id: &str) -> bool {
        self.rows
            .lock()
            .expect("lock")
            .contains_key(&(user_id.to_string(), device_id.to_string()))
    }
}

#[async_trait]
impl DeviceTokenStore for MemoryDeviceStore {
    async fn upsert(
        &self,
        user_id: &str,
        device_id: &str,
        hashed_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.rows.lock().expect("lock").insert(
            (user_id.to_string(), device_id.to_string()),
            DeviceTokenRecord {
                user_id: user_id.to_string(),
                device_id: device_id.to_string(),
                hashed_refresh_token: hashed_refresh_token.to_string(),
                creation: now,
            },
        );
        Ok(())
    }

    async fn fetch(&self, user_id: &str, device_id: &str) -> Result<Option<DeviceTokenRecord>> {
        Ok(self
            .rows
            .lock()
            .expect("lock")
            .get(&(user_id.to_string(), device_id.to_string()))
            .cloned())
    }

    async fn delete(&self, user_id: &str, device_id: &str) -> Result<()> {
        self.rows
            .lock()
            .expect("lock")
            .remove(&(user_id.to_string(), device_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    fn saw(&self, kind: AuditKind, author: &str, flag: AuditFlag) -> bool {
        self.records
            .lock()
            .expect("lock")
            .iter()
            .any(|record| record.kind == kind && record.author == author && record.flag == flag)
    }

    pub(crate) fn saw_failed_login(&self, author: &str) -> bool {
        self.saw(AuditKind::Login, author, AuditFlag::Warning)
    }

    pub(crate) fn saw_failed_token_login(&self, author: &str) -> bool {
        self.saw(AuditKind::TokenLogin, author, AuditFlag::Warning)
    }

    pub(crate) fn saw_successful_token_login(&self, author: &str) -> bool {
        self.saw(AuditKind::TokenLogin, author, AuditFlag::Normal)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        self.records.lock().expect("lock").push(record);
        Ok(())
    }
}

pub(crate) struct World {
    pub users: MemoryUserStore,
    pub devices: MemoryDeviceStore,
    pub audit: MemoryAuditSink,
    pub issuer: TokenIssuer,
    pub config: AuthConfig,
    pub now: DateTime<Utc>,
}

pub(crate) fn world() -> World {
    let config = AuthConfig::new();
    World {
        users: MemoryUserStore::default(),
        devices: MemoryDeviceStore::default(),
        audit: MemoryAuditSink::default(),
        issuer: TokenIssuer::new(SecretString::from("test-token-secret"), &config),
        config,
        now: DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp"),
    }
}

pub(crate) fn request(id: &str, password: &str, client_ip: &str, device_id: &str) -> LoginRequest {
    LoginRequest {
        id: id.to_string(),
        password: password.to_string(),
        client_ip: client_ip.to_string(),
        device_id: device_id.to_string(),
        region: None,
        organization: None,
    }
}
