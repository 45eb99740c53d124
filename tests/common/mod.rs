// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use somno_sync::config::Config;
use somno_sync::db::{FirestoreDb, HealthStore, MemoryStore};
use somno_sync::error::AppError;
use somno_sync::models::{
    AuditEvent, DailyHeartRateRecord, DailySleepRecord, StoredCredential, SyncRun, TokenUpdate,
};
use somno_sync::routes::create_router;
use somno_sync::services::kms::encrypt_tokens;
use somno_sync::services::KmsService;
use somno_sync::time_utils::format_utc_rfc3339;
use somno_sync::AppState;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Config with every Google endpoint pointed at a mock server.
#[allow(dead_code)]
pub fn config_for(server: &MockServer) -> Config {
    let base = server.uri();
    Config {
        google_token_url: format!("{}/token", base),
        google_revoke_url: format!("{}/revoke", base),
        google_fit_api_base: format!("{}/fitness/v1", base),
        ..Config::test_default()
    }
}

/// Create a test app over an in-memory store with offline KMS.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(
        AppState::new(config, store.clone(), KmsService::new_mock())
            .expect("Failed to build test state"),
    );
    (create_router(state.clone()), state, store)
}

/// Create a test app over any store.
#[allow(dead_code)]
pub fn create_test_app_with_store(
    config: Config,
    store: Arc<dyn HealthStore>,
) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(
        AppState::new(config, store, KmsService::new_mock()).expect("Failed to build test state"),
    );
    (create_router(state.clone()), state)
}

/// Store a connected credential encrypted with the mock KMS.
#[allow(dead_code)]
pub async fn seed_credential(
    store: &MemoryStore,
    account_id: u64,
    access_token: &str,
    refresh_token: Option<&str>,
    expiry: DateTime<Utc>,
) {
    let kms = KmsService::new_mock();
    let (access_encrypted, refresh_encrypted) =
        encrypt_tokens(&kms, access_token, refresh_token, account_id)
            .await
            .unwrap();

    store
        .put_credential(&StoredCredential {
            account_id,
            access_token_encrypted: access_encrypted,
            refresh_token_encrypted: refresh_encrypted,
            token_expiry: Some(format_utc_rfc3339(expiry)),
            connected: true,
            last_sync_at: None,
            scopes: vec![],
            updated_at: format_utc_rfc3339(Utc::now()),
        })
        .await
        .unwrap();
}

/// A UTC day inside the default sync window.
#[allow(dead_code)]
pub fn recent_day(days_ago: i64) -> NaiveDate {
    (Utc::now() - Duration::days(days_ago)).date_naive()
}

fn nanos_at(day: NaiveDate, hour: u32) -> String {
    let instant = day.and_hms_opt(hour, 0, 0).unwrap().and_utc();
    (instant.timestamp_millis() as i128 * 1_000_000).to_string()
}

/// Aggregate response with 2h deep + 1h REM sleep starting 01:00 on `day`.
#[allow(dead_code)]
pub fn sleep_body(day: NaiveDate) -> Value {
    json!({
        "bucket": [{"dataset": [{"point": [
            {"startTimeNanos": nanos_at(day, 1), "endTimeNanos": nanos_at(day, 3),
             "value": [{"intVal": 2}]},
            {"startTimeNanos": nanos_at(day, 3), "endTimeNanos": nanos_at(day, 4),
             "value": [{"intVal": 3}]}
        ]}]}]
    })
}

/// Aggregate response with two heart-rate samples (60 and 80 bpm) on `day`.
#[allow(dead_code)]
pub fn heart_rate_body(day: NaiveDate) -> Value {
    json!({
        "bucket": [{"dataset": [{"point": [
            {"startTimeNanos": nanos_at(day, 9), "endTimeNanos": nanos_at(day, 10),
             "value": [{"fpVal": 60.0}]},
            {"startTimeNanos": nanos_at(day, 14), "endTimeNanos": nanos_at(day, 15),
             "value": [{"fpVal": 80.0}]}
        ]}]}]
    })
}

/// Mount `dataset:aggregate` handlers for the sleep and heart-rate queries.
#[allow(dead_code)]
pub async fn mount_aggregate(
    server: &MockServer,
    sleep: ResponseTemplate,
    heart_rate: ResponseTemplate,
) {
    Mock::given(method("POST"))
        .and(path("/fitness/v1/users/me/dataset:aggregate"))
        .and(body_string_contains("com.google.sleep.segment"))
        .respond_with(sleep)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/fitness/v1/users/me/dataset:aggregate"))
        .and(body_string_contains("com.google.heart_rate.bpm"))
        .respond_with(heart_rate)
        .mount(server)
        .await;
}

/// Concatenate the buckets of several aggregate responses.
#[allow(dead_code)]
pub fn merge_buckets(bodies: &[Value]) -> Value {
    let buckets: Vec<Value> = bodies
        .iter()
        .filter_map(|b| b["bucket"].as_array())
        .flatten()
        .cloned()
        .collect();
    json!({ "bucket": buckets })
}

/// `MemoryStore` wrapper whose sleep inserts fail from the given call on.
#[allow(dead_code)]
pub struct FailingSleepStore {
    pub inner: Arc<MemoryStore>,
    fail_from: u32,
    sleep_inserts: AtomicU32,
}

#[allow(dead_code)]
impl FailingSleepStore {
    pub fn new(inner: Arc<MemoryStore>, fail_from: u32) -> Self {
        Self {
            inner,
            fail_from,
            sleep_inserts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl HealthStore for FailingSleepStore {
    async fn get_credential(&self, account_id: u64) -> Result<Option<StoredCredential>, AppError> {
        self.inner.get_credential(account_id).await
    }

    async fn put_credential(&self, credential: &StoredCredential) -> Result<(), AppError> {
        self.inner.put_credential(credential).await
    }

    async fn update_credential_tokens(
        &self,
        account_id: u64,
        update: &TokenUpdate,
    ) -> Result<bool, AppError> {
        self.inner.update_credential_tokens(account_id, update).await
    }

    async fn clear_credential(&self, account_id: u64) -> Result<(), AppError> {
        self.inner.clear_credential(account_id).await
    }

    async fn set_last_sync_at(&self, account_id: u64, at: &str) -> Result<(), AppError> {
        self.inner.set_last_sync_at(account_id, at).await
    }

    async fn list_connected_accounts(&self) -> Result<Vec<u64>, AppError> {
        self.inner.list_connected_accounts().await
    }

    async fn get_sleep_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailySleepRecord>, AppError> {
        self.inner.get_sleep_records_for_day(account_id, date).await
    }

    async fn insert_sleep_record(&self, record: &DailySleepRecord) -> Result<(), AppError> {
        let call = self.sleep_inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(AppError::Database("write rejected".to_string()));
        }
        self.inner.insert_sleep_record(record).await
    }

    async fn list_sleep_records(&self, account_id: u64) -> Result<Vec<DailySleepRecord>, AppError> {
        self.inner.list_sleep_records(account_id).await
    }

    async fn delete_provider_sleep_records(&self, account_id: u64) -> Result<usize, AppError> {
        self.inner.delete_provider_sleep_records(account_id).await
    }

    async fn get_heart_rate_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        self.inner.get_heart_rate_records_for_day(account_id, date).await
    }

    async fn insert_heart_rate_record(
        &self,
        record: &DailyHeartRateRecord,
    ) -> Result<(), AppError> {
        self.inner.insert_heart_rate_record(record).await
    }

    async fn list_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        self.inner.list_heart_rate_records(account_id).await
    }

    async fn delete_provider_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<usize, AppError> {
        self.inner.delete_provider_heart_rate_records(account_id).await
    }

    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), AppError> {
        self.inner.insert_sync_run(run).await
    }

    async fn list_sync_runs(&self, account_id: u64, limit: u32) -> Result<Vec<SyncRun>, AppError> {
        self.inner.list_sync_runs(account_id, limit).await
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        self.inner.insert_audit_event(event).await
    }
}
