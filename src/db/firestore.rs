// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing `HealthStore`.
//!
//! Collections:
//! - `google_fit_credentials/{account_id}` (encrypted OAuth tokens)
//! - `sleep_records/{account_id}_{date}_{source}`
//! - `heart_rate_records/{account_id}_{date}_{source}`
//! - `google_fit_sync_runs` and `audit_events` (append-only)

use super::{collections, daily_record_id, HealthStore};
use crate::error::AppError;
use crate::models::{
    AuditEvent, DailyHeartRateRecord, DailySleepRecord, RecordSource, StoredCredential, SyncRun,
    TokenUpdate,
};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use firestore::errors::{BackoffError, FirestoreError};
use futures_util::FutureExt;
use serde::Serialize;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client: every operation returns `AppError::Database`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Create-if-absent. An existing document maps to `StorageConflict`.
    async fn insert_unique<T>(&self, collection: &str, doc_id: &str, obj: &T) -> Result<(), AppError>
    where
        T: Serialize + Sync + Send + for<'de> serde::Deserialize<'de>,
    {
        let result: Result<T, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(doc_id)
            .object(obj)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(FirestoreError::DataConflictError(_)) => {
                Err(AppError::StorageConflict(doc_id.to_string()))
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    /// Query all daily records of one account, optionally restricted to a
    /// date or a source.
    async fn query_daily<T>(
        &self,
        collection: &str,
        account_id: u64,
        date: Option<NaiveDate>,
        source: Option<RecordSource>,
    ) -> Result<Vec<T>, AppError>
    where
        T: for<'de> serde::Deserialize<'de> + Send,
    {
        let date = date.map(|d| d.format("%Y-%m-%d").to_string());
        let source = source.map(|s| s.as_str());

        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| {
                q.for_all([
                    q.field("account_id").eq(account_id),
                    date.as_ref().and_then(|d| q.field("date").eq(d.clone())),
                    source.and_then(|s| q.field("source").eq(s)),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Batch delete documents using transactions.
    async fn batch_delete<T, F>(
        &self,
        items: &[T],
        collection: &str,
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .delete()
                    .from(collection)
                    .document_id(&doc_id)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add deletion to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction.commit().await.map_err(|e| {
                AppError::Database(format!("Failed to commit batch deletion: {}", e))
            })?;
        }

        Ok(())
    }

    /// Field-masked credential update. Only the listed paths are written.
    async fn patch_credential(
        &self,
        account_id: u64,
        patch: &StoredCredential,
        fields: Vec<String>,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(fields)
            .in_col(collections::CREDENTIALS)
            .document_id(account_id.to_string())
            .object(patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

fn append_only_id(account_id: u64) -> String {
    format!(
        "{}_{}",
        account_id,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

#[async_trait]
impl HealthStore for FirestoreDb {
    // ─── Credential Operations ───────────────────────────────────

    async fn get_credential(&self, account_id: u64) -> Result<Option<StoredCredential>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(&account_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_credential(&self, credential: &StoredCredential) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(credential.account_id.to_string())
            .object(credential)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update_credential_tokens(
        &self,
        account_id: u64,
        update: &TokenUpdate,
    ) -> Result<bool, AppError> {
        let patch = StoredCredential {
            account_id,
            access_token_encrypted: update.access_token_encrypted.clone(),
            refresh_token_encrypted: update.refresh_token_encrypted.clone(),
            token_expiry: Some(update.token_expiry.clone()),
            updated_at: format_utc_rfc3339(Utc::now()),
            ..Default::default()
        };
        let doc_id = account_id.to_string();

        // Reads inside run_transaction are registered for conflict detection,
        // so a concurrent refresh forces a retry with fresh data.
        self.get_client()?
            .run_transaction(|db, transaction| {
                let patch = patch.clone();
                let doc_id = doc_id.clone();
                async move {
                    let current: Option<StoredCredential> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::CREDENTIALS)
                        .obj()
                        .one(&doc_id)
                        .await?;

                    let expiry = patch.token_expiry.as_deref().unwrap_or_default();
                    if current.is_some_and(|c| c.outlives(expiry)) {
                        return Ok::<bool, BackoffError<FirestoreError>>(false);
                    }

                    db.fluent()
                        .update()
                        .fields(firestore::paths!(StoredCredential::{
                            access_token_encrypted,
                            refresh_token_encrypted,
                            token_expiry,
                            updated_at
                        }))
                        .in_col(collections::CREDENTIALS)
                        .document_id(&doc_id)
                        .object(&patch)
                        .add_to_transaction(transaction)?;

                    Ok(true)
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Token update transaction failed: {}", e)))
    }

    async fn clear_credential(&self, account_id: u64) -> Result<(), AppError> {
        let patch = StoredCredential {
            account_id,
            connected: false,
            updated_at: format_utc_rfc3339(Utc::now()),
            ..Default::default()
        };

        self.patch_credential(
            account_id,
            &patch,
            firestore::paths!(StoredCredential::{
                access_token_encrypted,
                refresh_token_encrypted,
                token_expiry,
                connected,
                updated_at
            }),
        )
        .await
    }

    async fn set_last_sync_at(&self, account_id: u64, at: &str) -> Result<(), AppError> {
        let patch = StoredCredential {
            account_id,
            last_sync_at: Some(at.to_string()),
            ..Default::default()
        };

        self.patch_credential(
            account_id,
            &patch,
            firestore::paths!(StoredCredential::{last_sync_at}),
        )
        .await
    }

    async fn list_connected_accounts(&self) -> Result<Vec<u64>, AppError> {
        let credentials: Vec<StoredCredential> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(|q| q.for_all([q.field("connected").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(credentials.into_iter().map(|c| c.account_id).collect())
    }

    // ─── Sleep Record Operations ─────────────────────────────────

    async fn get_sleep_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailySleepRecord>, AppError> {
        self.query_daily(collections::SLEEP_RECORDS, account_id, Some(date), None)
            .await
    }

    async fn insert_sleep_record(&self, record: &DailySleepRecord) -> Result<(), AppError> {
        let doc_id = daily_record_id(record.account_id, record.date, record.source);
        self.insert_unique(collections::SLEEP_RECORDS, &doc_id, record)
            .await
    }

    async fn list_sleep_records(&self, account_id: u64) -> Result<Vec<DailySleepRecord>, AppError> {
        self.query_daily(collections::SLEEP_RECORDS, account_id, None, None)
            .await
    }

    async fn delete_provider_sleep_records(&self, account_id: u64) -> Result<usize, AppError> {
        let records: Vec<DailySleepRecord> = self
            .query_daily(
                collections::SLEEP_RECORDS,
                account_id,
                None,
                Some(RecordSource::Provider),
            )
            .await?;

        self.batch_delete(&records, collections::SLEEP_RECORDS, |r| {
            daily_record_id(r.account_id, r.date, r.source)
        })
        .await?;

        tracing::debug!(account_id, count = records.len(), "Deleted provider sleep records");
        Ok(records.len())
    }

    // ─── Heart-Rate Record Operations ────────────────────────────

    async fn get_heart_rate_records_for_day(
        &self,
        account_id: u64,
        date: NaiveDate,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        self.query_daily(collections::HEART_RATE_RECORDS, account_id, Some(date), None)
            .await
    }

    async fn insert_heart_rate_record(
        &self,
        record: &DailyHeartRateRecord,
    ) -> Result<(), AppError> {
        let doc_id = daily_record_id(record.account_id, record.date, record.source);
        self.insert_unique(collections::HEART_RATE_RECORDS, &doc_id, record)
            .await
    }

    async fn list_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<Vec<DailyHeartRateRecord>, AppError> {
        self.query_daily(collections::HEART_RATE_RECORDS, account_id, None, None)
            .await
    }

    async fn delete_provider_heart_rate_records(
        &self,
        account_id: u64,
    ) -> Result<usize, AppError> {
        let records: Vec<DailyHeartRateRecord> = self
            .query_daily(
                collections::HEART_RATE_RECORDS,
                account_id,
                None,
                Some(RecordSource::Provider),
            )
            .await?;

        self.batch_delete(&records, collections::HEART_RATE_RECORDS, |r| {
            daily_record_id(r.account_id, r.date, r.source)
        })
        .await?;

        tracing::debug!(
            account_id,
            count = records.len(),
            "Deleted provider heart-rate records"
        );
        Ok(records.len())
    }

    // ─── Sync History & Audit ────────────────────────────────────

    async fn insert_sync_run(&self, run: &SyncRun) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SYNC_RUNS)
            .document_id(append_only_id(run.account_id))
            .object(run)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_sync_runs(&self, account_id: u64, limit: u32) -> Result<Vec<SyncRun>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SYNC_RUNS)
            .filter(move |q| q.for_all([q.field("account_id").eq(account_id)]))
            .order_by([("started_at", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn insert_audit_event(&self, event: &AuditEvent) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::AUDIT_EVENTS)
            .document_id(append_only_id(event.account_id))
            .object(event)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
