// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token lifecycle tests against a mock Google token endpoint.

use chrono::{Duration, Utc};
use serde_json::json;
use somno_sync::db::HealthStore;
use somno_sync::services::kms::decrypt_token;
use somno_sync::services::{KmsService, TokenState};
use somno_sync::time_utils::parse_utc_rfc3339;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{config_for, create_test_app, seed_credential};

const ACCOUNT: u64 = 1001;

#[tokio::test]
async fn test_valid_token_is_returned_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "still-good", Some("r1"), Utc::now() + Duration::days(2)).await;

    let token = state.tokens.get_valid_access_token(ACCOUNT).await.unwrap();
    assert_eq!(token.as_deref(), Some("still-good"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_refresh_token_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(
        &store,
        ACCOUNT,
        "stale-access",
        Some("long-lived-refresh"),
        Utc::now() - Duration::seconds(1),
    )
    .await;

    let token = state.tokens.get_valid_access_token(ACCOUNT).await.unwrap();
    assert_eq!(token.as_deref(), Some("fresh-access"));

    let stored = store.get_credential(ACCOUNT).await.unwrap().unwrap();
    let expiry = parse_utc_rfc3339(stored.token_expiry.as_deref().unwrap()).unwrap();
    assert!(expiry > Utc::now(), "new expiry must be in the future");

    let kms = KmsService::new_mock();
    let refresh = decrypt_token(&kms, stored.refresh_token_encrypted.as_deref().unwrap(), ACCOUNT)
        .await
        .unwrap();
    assert_eq!(refresh, "long-lived-refresh");

    // Second call is served from cache; the mock expects exactly one refresh
    let again = state.tokens.get_valid_access_token(ACCOUNT).await.unwrap();
    assert_eq!(again.as_deref(), Some("fresh-access"));
}

#[tokio::test]
async fn test_expired_without_refresh_token_needs_reauthorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "stale", None, Utc::now() - Duration::minutes(5)).await;
    let before = store.get_credential(ACCOUNT).await.unwrap();

    let token = state.tokens.get_valid_access_token(ACCOUNT).await.unwrap();
    assert!(token.is_none());
    assert_eq!(store.get_credential(ACCOUNT).await.unwrap(), before);
}

#[tokio::test]
async fn test_failed_refresh_keeps_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "stale", Some("r1"), Utc::now() - Duration::minutes(5)).await;
    let before = store.get_credential(ACCOUNT).await.unwrap();

    let token = state.tokens.get_valid_access_token(ACCOUNT).await.unwrap();
    assert!(token.is_none());

    let after = store.get_credential(ACCOUNT).await.unwrap();
    assert_eq!(after, before);
    assert!(after.unwrap().connected);
}

#[tokio::test]
async fn test_unknown_account_has_no_token() {
    let server = MockServer::start().await;
    let (_, state, _) = create_test_app(config_for(&server));

    assert!(state
        .tokens
        .get_valid_access_token(ACCOUNT)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        state.tokens.status(ACCOUNT).await.unwrap().state,
        TokenState::Disconnected
    );
}

#[tokio::test]
async fn test_status_reports_expiring_soon() {
    let server = MockServer::start().await;
    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "a", Some("r"), Utc::now() + Duration::hours(3)).await;

    let status = state.tokens.status(ACCOUNT).await.unwrap();
    assert_eq!(status.state, TokenState::ExpiringSoon);
    assert!(status.connected);
    assert!(matches!(status.hours_until_expiry, Some(2) | Some(3)));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "shared-access",
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "stale", Some("r1"), Utc::now() - Duration::minutes(1)).await;

    let (first, second) = tokio::join!(
        state.tokens.get_valid_access_token(ACCOUNT),
        state.tokens.get_valid_access_token(ACCOUNT),
    );
    assert_eq!(first.unwrap().as_deref(), Some("shared-access"));
    assert_eq!(second.unwrap().as_deref(), Some("shared-access"));
}

#[tokio::test]
async fn test_later_stored_token_wins_over_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": "slow-access",
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let (_, state, store) = create_test_app(config_for(&server));
    seed_credential(&store, ACCOUNT, "stale", Some("r1"), Utc::now() - Duration::minutes(1)).await;

    // Another instance finishes its refresh while ours is in flight
    let other_instance = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        seed_credential(&store, ACCOUNT, "other-access", Some("r1"), Utc::now() + Duration::hours(2))
            .await;
    };
    let (token, ()) = tokio::join!(state.tokens.get_valid_access_token(ACCOUNT), other_instance);
    assert_eq!(token.unwrap().as_deref(), Some("other-access"));

    let stored = store.get_credential(ACCOUNT).await.unwrap().unwrap();
    let kms = KmsService::new_mock();
    assert_eq!(
        decrypt_token(&kms, &stored.access_token_encrypted, ACCOUNT)
            .await
            .unwrap(),
        "other-access"
    );
}
