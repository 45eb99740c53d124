// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory `HealthStore` with the same uniqueness rules as Firestore.

use super::{daily_record_id, HealthStore};
use crate::error::AppError;
use crate::models::{
    AuditEvent, DailyHeartRateRecord, DailySleepRecord, RecordSource, StoredCredential, SyncRun,
    TokenUpdate,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    credentials: HashMap<u64, StoredCredential>,
    sleep: BTreeMap<String, DailySleepRecord>,
    heart_rate: BTreeMap<String, DailyHeartRateRecord>,
    sync_runs: Vec<SyncRun>,
    audit: Vec<AuditEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit events recorded so far, oldest first.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.read().await.audit.clone()
    }
}

fn missing_credential(account_id: u64) -> AppError {
    AppError::NotFound(format!("Credential for account {}", account_id))
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn get_credential(&self, account_id: u64) -> Result<Option<StoredCredential>, AppError> {
        Ok(self.inner.read().await.credentials.get(&account_id).cloned())
    }

    async fn put_credential(&self, credential: &StoredCredential) -> Result<(), AppError> {
        self.inner
            .write()
            .await
            .credentials
            .insert(credential.account_id, credential.clone());
        Ok(())
    }

    async fn update_credential_tokens(
        &self,
        account_id: u64,
        update: &TokenUpdate,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        let cred = inner
            .credentials
            .get_mut(&account_id)
            .ok_or_else(|| missing_credential(account_id))?;
        if cred.outlives(&update.token_expiry) {
            return Ok(false);
        }
        cred.access_token_encrypted = update.access_token_encrypted.clone();
        cred.refresh_token_encrypted = update.refresh_token_encrypted.clone();
        cred.token_expiry = Some(update.token_expiry.clone());
        Ok(true)
    }

    async fn clear_credential(&self, account_id: u64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(cred) = inner.credentials.get_mut(&account_id) {
            cred.access_token_encrypted.clear();
            cred.refresh_token_encrypted = None;
            cred.token_expiry = None;
            cred.connected = false;
        }
        Ok(())
    }

    async fn set_last_sync_at(&self, account_id: u64, at: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let cred = inner
            .credentials
            .get_mut(&account_id)
            .ok_or_else(|| missing_credential(account_id))?;
        cred.last_sync_at = Some(at.to_string());
        Ok(())
    }

    async fn list_connected_accounts(&self) -> Result<Vec<u64>, AppError> {
        let inner = self.inner.read().await;
        let mut ids: Vec<u64> = inner
            .credentials
            .values()
            .filter(|c| c.connected)
            .map(|c| c.account_id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn get_sleep_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailySleepRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .sleep
            .values()
            .filter(|r| r.account_id == account_id && r.date == date)
            .cloned()
            .collect())
    }

    async fn insert_sleep_record(&self, record: &DailySleepRecord) -> Result<(), AppError> {
        let id = daily_record_id(record.account_id, record.date, record.source);
        let mut inner = self.inner.write().await;
        if inner.sleep.contains_key(&id) {
            return Err(AppError::StorageConflict(id));
        }
        inner.sleep.insert(id, record.clone());
        Ok(())
    }

    async fn list_sleep_records(&self, account_id: u64) -> Result<Vec<DailySleepRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .sleep
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_provider_sleep_records(&self, account_id: u64) -> Result<usize, AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.sleep.len();
        inner
            .sleep
            .retain(|_, r| !(r.account_id == account_id && r.source == RecordSource::Provider));
        Ok(before - inner.sleep.len())
    }

    async fn get_heart_rate_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .heart_rate
            .values()
            .filter(|r| r.account_id == account_id && r.date == date)
            .cloned()
            .collect())
    }

    async fn insert_heart_rate_record(
        &self,
        record: &DailyHeartRateRecord,
    ) -> Result<(), AppError> {
        let id = daily_record_id(record.account_id, record.date, record.source);
        let mut inner = self.inner.write().await;
        if inner.heart_rate.contains_key(&id) {
            return Err(AppError::StorageConflict(id));
        }
        inner.heart_rate.insert(id, record.clone());
        Ok(())
    }

    async fn list_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .heart_rate
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_provider_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<usize, AppError> {
        let mut inner = self.inner.write().await;
        let before = inner.heart_rate.len();
        inner
            .heart_rate
            .retain(|_, r| !(r.account_id == account_id && r.source == RecordSource::Provider));
        Ok(before - inner.heart_rate.len())
    }

    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), AppError> {
        self.inner.write().await.sync_runs.push(run.clone());
        Ok(())
    }

    async fn list_sync_runs(&self, account_id: u64, limit: u32) -> Result<Vec<SyncRun>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .sync_runs
            .iter()
            .rev()
            .filter(|r| r.account_id == account_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        self.inner.write().await.audit.push(event.clone());
        Ok(())
    }
}
