// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync pass tests against a mock Google Fit API.

use chrono::{Duration, Utc};
use somno_sync::db::{HealthStore, MemoryStore};
use somno_sync::error::AppError;
use somno_sync::models::{
    DailySleepRecord, RecordSource, SyncRunStatus, SyncTrigger,
};
use std::sync::Arc;
use wiremock::{MockServer, ResponseTemplate};

mod common;
use common::{
    config_for, create_test_app, create_test_app_with_store, heart_rate_body, merge_buckets,
    mount_aggregate, recent_day, seed_credential, sleep_body, FailingSleepStore,
};

const ACCOUNT: u64 = 2002;

fn manual_sleep(date: chrono::NaiveDate) -> DailySleepRecord {
    DailySleepRecord {
        account_id: ACCOUNT,
        date,
        total_minutes: 400,
        deep_minutes: 80,
        rem_minutes: 80,
        light_minutes: 220,
        awake_minutes: 20,
        deep_percent: 20,
        rem_percent: 20,
        light_percent: 55,
        awake_percent: 5,
        sleep_efficiency: 95,
        sleep_score: None,
        source: RecordSource::Manual,
        provider_record_id: None,
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn test_sync_stores_daily_records() {
    let server = MockServer::start().await;
    let day = recent_day(3);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(sleep_body(day)),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(day)),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.status(), SyncRunStatus::Success);
    assert_eq!(report.sleep.synced, 1);
    assert_eq!(report.heart_rate.synced, 1);

    let sleep = store.list_sleep_records(ACCOUNT).await.unwrap();
    assert_eq!(sleep.len(), 1);
    assert_eq!(sleep[0].date, day);
    assert_eq!(sleep[0].source, RecordSource::Provider);
    assert_eq!(sleep[0].deep_minutes, 120);
    assert_eq!(sleep[0].rem_minutes, 60);
    assert!(sleep[0].total_minutes >= 180);

    let heart_rate = store.list_heart_rate_records(ACCOUNT).await.unwrap();
    assert_eq!(heart_rate.len(), 1);
    assert_eq!(heart_rate[0].avg_bpm, 70);
    assert_eq!(heart_rate[0].min_bpm, 60);
    assert_eq!(heart_rate[0].max_bpm, 80);

    let credential = store.get_credential(ACCOUNT).await.unwrap().unwrap();
    assert_eq!(credential.last_sync_at.as_deref(), Some(report.started_at.as_str()));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let server = MockServer::start().await;
    let day = recent_day(2);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(sleep_body(day)),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(day)),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    state.sync.sync_account(ACCOUNT).await.unwrap();
    let second = state.sync.sync_account(ACCOUNT).await.unwrap();

    assert_eq!(second.sleep.synced, 0);
    assert_eq!(second.sleep.skipped, 1);
    assert_eq!(second.heart_rate.synced, 0);
    assert_eq!(store.list_sleep_records(ACCOUNT).await.unwrap().len(), 1);
    assert_eq!(store.list_heart_rate_records(ACCOUNT).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_manual_record_takes_precedence() {
    let server = MockServer::start().await;
    let day = recent_day(4);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(sleep_body(day)),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(day)),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;
    store.insert_sleep_record(&manual_sleep(day)).await.unwrap();

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.sleep.synced, 0);
    assert_eq!(report.sleep.skipped, 1);

    let sleep = store.list_sleep_records(ACCOUNT).await.unwrap();
    assert_eq!(sleep.len(), 1);
    assert_eq!(sleep[0].source, RecordSource::Manual);
    assert_eq!(sleep[0].total_minutes, 400);
}

#[tokio::test]
async fn test_one_failing_kind_yields_partial_result() {
    let server = MockServer::start().await;
    let day = recent_day(1);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(sleep_body(day)),
        ResponseTemplate::new(503),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.status(), SyncRunStatus::Partial);
    assert_eq!(report.sleep.synced, 1);
    assert_eq!(report.failed_kinds(), vec!["heart_rate"]);
    assert!(report.heart_rate.error.as_ref().unwrap().transient);

    assert_eq!(store.list_sleep_records(ACCOUNT).await.unwrap().len(), 1);
    assert!(store.list_heart_rate_records(ACCOUNT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_both_kinds_failing_is_recorded() {
    let server = MockServer::start().await;
    mount_aggregate(
        &server,
        ResponseTemplate::new(500),
        ResponseTemplate::new(429),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state
        .sync
        .run_and_record(ACCOUNT, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(report.status(), SyncRunStatus::TransientError);

    let runs = store.list_sync_runs(ACCOUNT, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, SyncRunStatus::TransientError);
    assert_eq!(runs[0].trigger, SyncTrigger::Manual);
    assert!(runs[0].error_message.is_some());
}

#[tokio::test]
async fn test_malformed_body_stores_nothing_for_that_kind() {
    let server = MockServer::start().await;
    let day = recent_day(2);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(day)),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.status(), SyncRunStatus::Partial);
    assert!(store.list_sleep_records(ACCOUNT).await.unwrap().is_empty());
    assert_eq!(store.list_heart_rate_records(ACCOUNT).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disconnected_account_is_not_authorized() {
    let server = MockServer::start().await;
    let (_, state, store) = create_test_app(config_for(&server));

    let err = state.sync.sync_account(ACCOUNT).await.unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized));

    // The failed pass still shows up in history
    let err = state
        .sync
        .run_and_record(ACCOUNT, SyncTrigger::Scheduled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAuthorized));
    let runs = store.list_sync_runs(ACCOUNT, 10).await.unwrap();
    assert_eq!(runs[0].status, SyncRunStatus::NotAuthorized);
}

#[tokio::test]
async fn test_empty_provider_response_is_success() {
    let server = MockServer::start().await;
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"bucket": []})),
        ResponseTemplate::new(200).set_body_json(serde_json::json!({})),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.status(), SyncRunStatus::Success);
    assert_eq!(report.sleep.synced + report.heart_rate.synced, 0);
    assert!(store
        .get_credential(ACCOUNT)
        .await
        .unwrap()
        .unwrap()
        .last_sync_at
        .is_some());
}

#[tokio::test]
async fn test_current_day_is_left_for_a_later_pass() {
    let server = MockServer::start().await;
    let yesterday = recent_day(1);
    let today = recent_day(0);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(merge_buckets(&[sleep_body(yesterday), sleep_body(today)])),
        ResponseTemplate::new(200)
            .set_body_json(merge_buckets(&[heart_rate_body(yesterday), heart_rate_body(today)])),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state.sync.sync_account(ACCOUNT).await.unwrap();
    assert_eq!(report.sleep.synced, 1);
    assert_eq!(report.heart_rate.synced, 1);

    let sleep = store.list_sleep_records(ACCOUNT).await.unwrap();
    assert_eq!(sleep.len(), 1);
    assert_eq!(sleep[0].date, yesterday);
    assert!(store
        .get_sleep_records_for_day(ACCOUNT, today)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .get_heart_rate_records_for_day(ACCOUNT, today)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_storage_failure_keeps_counts_of_committed_rows() {
    let server = MockServer::start().await;
    mount_aggregate(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(merge_buckets(&[sleep_body(recent_day(3)), sleep_body(recent_day(2))])),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(recent_day(2))),
    )
    .await;

    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(FailingSleepStore::new(memory.clone(), 2));
    let (_, state) = create_test_app_with_store(config_for(&server), store);
    seed_credential(&memory, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let report = state
        .sync
        .run_and_record(ACCOUNT, SyncTrigger::Manual)
        .await
        .unwrap();
    assert_eq!(report.status(), SyncRunStatus::Partial);
    assert_eq!(report.sleep.synced, 1);
    assert!(report.sleep.error.is_some());
    assert_eq!(report.heart_rate.synced, 1);
    assert_eq!(memory.list_sleep_records(ACCOUNT).await.unwrap().len(), 1);

    let runs = memory.list_sync_runs(ACCOUNT, 10).await.unwrap();
    assert_eq!(runs[0].synced_sleep_count, 1);
    assert_eq!(runs[0].status, SyncRunStatus::Partial);
}

#[tokio::test]
async fn test_concurrent_passes_store_each_day_once() {
    let server = MockServer::start().await;
    let day = recent_day(2);
    mount_aggregate(
        &server,
        ResponseTemplate::new(200).set_body_json(sleep_body(day)),
        ResponseTemplate::new(200).set_body_json(heart_rate_body(day)),
    )
    .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "access", Some("refresh"), Utc::now() + Duration::days(2)).await;

    let (first, second) = tokio::join!(
        state.sync.sync_account(ACCOUNT),
        state.sync.sync_account(ACCOUNT),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.sleep.synced + second.sleep.synced, 1);
    assert_eq!(first.sleep.skipped + second.sleep.skipped, 1);
    assert_eq!(first.heart_rate.synced + second.heart_rate.synced, 1);
    assert_eq!(first.heart_rate.skipped + second.heart_rate.skipped, 1);

    assert_eq!(store.list_sleep_records(ACCOUNT).await.unwrap().len(), 1);
    assert_eq!(store.list_heart_rate_records(ACCOUNT).await.unwrap().len(), 1);
}
