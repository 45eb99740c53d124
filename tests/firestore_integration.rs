// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with FIRESTORE_EMULATOR_HOST set, e.g. `localhost:8181`.
//!
//! The emulator provides a clean state for each test run.

use chrono::NaiveDate;
use somno_sync::db::HealthStore;
use somno_sync::error::AppError;
use somno_sync::models::{
    DailyHeartRateRecord, DailySleepRecord, RecordSource, StoredCredential, SyncRun,
    SyncRunStatus, SyncTrigger, TokenUpdate,
};

mod common;
use common::test_db;

/// Generate a unique account ID for test isolation.
fn unique_account_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

fn credential(account_id: u64) -> StoredCredential {
    StoredCredential {
        account_id,
        access_token_encrypted: "enc-access".to_string(),
        refresh_token_encrypted: Some("enc-refresh".to_string()),
        token_expiry: Some("2026-05-01T10:00:00Z".to_string()),
        connected: true,
        last_sync_at: None,
        scopes: vec!["https://www.googleapis.com/auth/fitness.sleep.read".to_string()],
        updated_at: "2026-05-01T09:00:00Z".to_string(),
    }
}

fn sleep(account_id: u64, day: u32, source: RecordSource) -> DailySleepRecord {
    DailySleepRecord {
        account_id,
        date: NaiveDate::from_ymd_opt(2026, 4, day).unwrap(),
        total_minutes: 430,
        deep_minutes: 90,
        rem_minutes: 100,
        light_minutes: 220,
        awake_minutes: 20,
        deep_percent: 21,
        rem_percent: 23,
        light_percent: 51,
        awake_percent: 5,
        sleep_efficiency: 95,
        sleep_score: Some(88),
        source,
        provider_record_id: Some("1-2".to_string()),
        created_at: "2026-04-30T02:00:00Z".to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CREDENTIAL TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_credential_lifecycle() {
    require_emulator!();

    let db = test_db().await;
    let account_id = unique_account_id();

    assert!(db.get_credential(account_id).await.unwrap().is_none());

    db.put_credential(&credential(account_id)).await.unwrap();
    assert_eq!(
        db.get_credential(account_id).await.unwrap(),
        Some(credential(account_id))
    );

    let update = |access: &str, expiry: &str| TokenUpdate {
        access_token_encrypted: access.to_string(),
        refresh_token_encrypted: Some("enc-refresh".to_string()),
        token_expiry: expiry.to_string(),
    };
    assert!(db
        .update_credential_tokens(account_id, &update("enc-access-2", "2026-05-01T11:00:00Z"))
        .await
        .unwrap());

    // An older refresh result must not replace the later token
    assert!(!db
        .update_credential_tokens(account_id, &update("enc-stale", "2026-05-01T10:30:00Z"))
        .await
        .unwrap());
    db.set_last_sync_at(account_id, "2026-05-01T10:30:00Z")
        .await
        .unwrap();

    let fetched = db.get_credential(account_id).await.unwrap().unwrap();
    assert_eq!(fetched.access_token_encrypted, "enc-access-2");
    assert_eq!(fetched.token_expiry.as_deref(), Some("2026-05-01T11:00:00Z"));
    assert_eq!(fetched.last_sync_at.as_deref(), Some("2026-05-01T10:30:00Z"));
    assert_eq!(fetched.scopes.len(), 1, "partial updates keep other fields");

    assert!(db
        .list_connected_accounts()
        .await
        .unwrap()
        .contains(&account_id));

    db.clear_credential(account_id).await.unwrap();
    let cleared = db.get_credential(account_id).await.unwrap().unwrap();
    assert!(!cleared.connected);
    assert!(cleared.access_token_encrypted.is_empty());
    assert!(cleared.refresh_token_encrypted.is_none());
    assert!(!db
        .list_connected_accounts()
        .await
        .unwrap()
        .contains(&account_id));

    println!("✓ Credential lifecycle verified: account_id={}", account_id);
}

// ═══════════════════════════════════════════════════════════════════════════
// DAILY RECORD TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_daily_record_uniqueness() {
    require_emulator!();

    let db = test_db().await;
    let account_id = unique_account_id();

    db.insert_sleep_record(&sleep(account_id, 10, RecordSource::Provider))
        .await
        .unwrap();
    let err = db
        .insert_sleep_record(&sleep(account_id, 10, RecordSource::Provider))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StorageConflict(_)));

    // Manual record for the same day is a different key
    db.insert_sleep_record(&sleep(account_id, 10, RecordSource::Manual))
        .await
        .unwrap();

    let date = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
    assert_eq!(
        db.get_sleep_records_for_day(account_id, date)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_delete_provider_records_keeps_manual() {
    require_emulator!();

    let db = test_db().await;
    let account_id = unique_account_id();

    for day in 1..=3 {
        db.insert_sleep_record(&sleep(account_id, day, RecordSource::Provider))
            .await
            .unwrap();
    }
    db.insert_sleep_record(&sleep(account_id, 4, RecordSource::Manual))
        .await
        .unwrap();
    db.insert_heart_rate_record(&DailyHeartRateRecord {
        account_id,
        date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
        avg_bpm: 62,
        min_bpm: 50,
        max_bpm: 120,
        sample_count: 20,
        source: RecordSource::Provider,
        provider_record_id: None,
        created_at: "2026-04-30T02:00:00Z".to_string(),
    })
    .await
    .unwrap();

    assert_eq!(db.delete_provider_sleep_records(account_id).await.unwrap(), 3);
    assert_eq!(
        db.delete_provider_heart_rate_records(account_id)
            .await
            .unwrap(),
        1
    );

    let remaining = db.list_sleep_records(account_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source, RecordSource::Manual);
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNC HISTORY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sync_runs_newest_first() {
    require_emulator!();

    let db = test_db().await;
    let account_id = unique_account_id();

    for (minute, status) in [(0, SyncRunStatus::Success), (5, SyncRunStatus::Partial)] {
        db.insert_sync_run(&SyncRun {
            account_id,
            trigger: SyncTrigger::Scheduled,
            status,
            synced_sleep_count: 1,
            synced_heart_rate_count: 1,
            error_message: None,
            started_at: format!("2026-05-01T02:{:02}:00Z", minute),
            duration_ms: 1200,
        })
        .await
        .unwrap();
    }

    let runs = db.list_sync_runs(account_id, 10).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].status, SyncRunStatus::Partial);

    assert_eq!(db.list_sync_runs(account_id, 1).await.unwrap().len(), 1);
}
