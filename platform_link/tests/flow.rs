//! End-to-end flow tests for the connection manager against a mock
//! provider: callback handling, expiry gating, and single-flight refresh.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use platform_link::{
    ACTIVITY_OAUTH_CONNECTED, ACTIVITY_OAUTH_DISCONNECTED, AuthState, CallbackQuery,
    ConnectError, Connection, ConnectionStore, MemoryConnectionStore, Platform,
};

use common::{cipher, manager_for, signer, spawn_mock_provider};

fn callback_query(code: &str, state: &str) -> CallbackQuery {
    CallbackQuery {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        error: None,
        error_description: None,
    }
}

fn signed_state(user_id: &str) -> String {
    signer().sign(&AuthState::issue(user_id, Platform::Google))
}

/// A connection as the callback handler would have persisted it, with
/// encrypted token material and a controllable expiry.
fn seeded_connection(id: &str, expired: bool, with_refresh: bool) -> Connection {
    let cipher = cipher();
    let now = Utc::now();
    let expiry = if expired {
        now - Duration::hours(1)
    } else {
        now + Duration::hours(1)
    };
    Connection {
        id: id.to_string(),
        user_id: "u1".to_string(),
        platform: "google".to_string(),
        platform_user_id: Some("g-123".to_string()),
        display_name: Some("Mock User".to_string()),
        email: Some("mock@example.com".to_string()),
        access_token: Some(cipher.encrypt("T-old").unwrap()),
        refresh_token: with_refresh.then(|| cipher.encrypt("R-old").unwrap()),
        token_expiry: Some(expiry),
        scope: Some("openid email".to_string()),
        is_active: true,
        last_sync: Some(now - Duration::hours(2)),
        created_at: now - Duration::days(1),
        updated_at: now - Duration::hours(2),
    }
}

#[tokio::test]
async fn test_denied_callback_skips_token_exchange() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let result = manager
        .handle_callback(CallbackQuery {
            code: None,
            state: Some(signed_state("u1")),
            error: Some("access_denied".to_string()),
            error_description: Some("User denied consent".to_string()),
        })
        .await;

    match result {
        Err(ConnectError::ProviderDenied(msg)) => assert!(msg.contains("access_denied")),
        other => panic!("Expected ProviderDenied, got {other:?}"),
    }
    assert_eq!(provider.state.exchange_calls.load(Ordering::SeqCst), 0);
    assert!(store.get_connections_for_user("u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_requires_code_and_state() {
    let provider = spawn_mock_provider().await;
    let manager = manager_for(&provider.base_url, Arc::new(MemoryConnectionStore::new()));

    let missing_code = manager
        .handle_callback(CallbackQuery {
            code: None,
            state: Some(signed_state("u1")),
            error: None,
            error_description: None,
        })
        .await;
    assert!(matches!(missing_code, Err(ConnectError::InvalidCallback(_))));

    let missing_state = manager
        .handle_callback(CallbackQuery {
            code: Some("code-1".to_string()),
            state: None,
            error: None,
            error_description: None,
        })
        .await;
    assert!(matches!(missing_state, Err(ConnectError::InvalidCallback(_))));

    assert_eq!(provider.state.exchange_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_callback_rejects_forged_state() {
    let provider = spawn_mock_provider().await;
    let manager = manager_for(&provider.base_url, Arc::new(MemoryConnectionStore::new()));

    // Signed under a different secret - as if an attacker minted it.
    let forged = platform_link::StateSigner::new(b"attacker-secret")
        .sign(&AuthState::issue("victim", Platform::Google));

    let result = manager.handle_callback(callback_query("code-1", &forged)).await;
    assert!(matches!(result, Err(ConnectError::InvalidCallback(_))));
    assert_eq!(provider.state.exchange_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_successful_callback_persists_encrypted_connection() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let before = Utc::now();
    let outcome = manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .unwrap();
    assert_eq!(outcome.platform, Platform::Google);

    let connections = store.get_connections_for_user("u1").await.unwrap();
    assert_eq!(connections.len(), 1);
    let connection = &connections[0];
    assert_eq!(connection.id, outcome.connection_id);
    assert!(connection.is_active);
    assert_eq!(connection.platform, "google");
    assert_eq!(connection.platform_user_id.as_deref(), Some("g-123"));
    assert_eq!(connection.display_name.as_deref(), Some("Mock User"));
    assert!(connection.last_sync.is_some());

    // Tokens are stored as cipher blobs that decrypt to what the provider
    // issued; plaintext appears nowhere in the record.
    let cipher = cipher();
    assert_ne!(connection.access_token.as_deref(), Some("T"));
    assert_eq!(
        cipher.decrypt(connection.access_token.as_deref().unwrap()).unwrap(),
        "T"
    );
    assert_eq!(
        cipher.decrypt(connection.refresh_token.as_deref().unwrap()).unwrap(),
        "R"
    );

    // expires_in=3600 becomes an absolute expiry about an hour out.
    let expiry = connection.token_expiry.unwrap();
    let expected = before + Duration::seconds(3600);
    assert!((expiry - expected).num_seconds().abs() < 10);

    // The audit feed saw the connect.
    let activities = store.activities_for_user("u1", 10).await.unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].activity_type, ACTIVITY_OAUTH_CONNECTED);
    assert_eq!(activities[0].metadata["platform"], "google");
}

#[tokio::test]
async fn test_callback_tolerates_userinfo_failure() {
    let provider = spawn_mock_provider().await;
    provider.state.fail_userinfo.store(true, Ordering::SeqCst);
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .expect("profile failure must not abort the connection");

    let connections = store.get_connections_for_user("u1").await.unwrap();
    assert_eq!(connections.len(), 1);
    assert!(connections[0].platform_user_id.is_none());
    assert!(connections[0].display_name.is_none());
    assert!(connections[0].access_token.is_some());
}

#[tokio::test]
async fn test_replayed_code_fails_exchange() {
    let provider = spawn_mock_provider().await;
    let manager = manager_for(&provider.base_url, Arc::new(MemoryConnectionStore::new()));

    let result = manager
        .handle_callback(callback_query("expired-code", &signed_state("u1")))
        .await;

    match result {
        Err(ConnectError::TokenExchange(msg)) => assert!(msg.contains("invalid_grant")),
        other => panic!("Expected TokenExchange, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconnect_replaces_existing_connection() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let first = manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .unwrap();
    let second = manager
        .handle_callback(callback_query("code-2", &signed_state("u1")))
        .await
        .unwrap();

    // One live connection per (user, platform): same row, replaced tokens.
    assert_eq!(first.connection_id, second.connection_id);
    let connections = store.get_connections_for_user("u1").await.unwrap();
    assert_eq!(connections.len(), 1);
}

#[tokio::test]
async fn test_fresh_token_returned_without_refresh() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    store
        .upsert_connection(seeded_connection("conn-1", false, true))
        .await
        .unwrap();

    let token = manager.get_usable_access_token("conn-1").await.unwrap();
    assert_eq!(token, "T-old");
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_connection_refreshes_exactly_once() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    store
        .upsert_connection(seeded_connection("conn-1", true, true))
        .await
        .unwrap();

    let token = manager.get_usable_access_token("conn-1").await.unwrap();
    assert_eq!(token, "T-refreshed-1");
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 1);

    // The rotated access token was persisted encrypted, expiry moved out,
    // and the refresh token ciphertext was left alone (no rotation).
    let connection = store.get_connection("conn-1").await.unwrap().unwrap();
    let cipher = cipher();
    assert_eq!(
        cipher.decrypt(connection.access_token.as_deref().unwrap()).unwrap(),
        "T-refreshed-1"
    );
    assert_eq!(
        cipher.decrypt(connection.refresh_token.as_deref().unwrap()).unwrap(),
        "R-old"
    );
    assert!(connection.token_expiry.unwrap() > Utc::now());

    // A follow-up call reuses the fresh token without another refresh.
    let token = manager.get_usable_access_token("conn-1").await.unwrap();
    assert_eq!(token, "T-refreshed-1");
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_provider_rotated_refresh_token_is_persisted() {
    let provider = spawn_mock_provider().await;
    provider
        .state
        .rotate_refresh_token
        .store(true, Ordering::SeqCst);
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    store
        .upsert_connection(seeded_connection("conn-1", true, true))
        .await
        .unwrap();

    manager.get_usable_access_token("conn-1").await.unwrap();

    let connection = store.get_connection("conn-1").await.unwrap().unwrap();
    assert_eq!(
        cipher().decrypt(connection.refresh_token.as_deref().unwrap()).unwrap(),
        "R-rotated"
    );
}

#[tokio::test]
async fn test_expired_without_refresh_token_is_unrecoverable() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    store
        .upsert_connection(seeded_connection("conn-1", true, false))
        .await
        .unwrap();

    match manager.get_usable_access_token("conn-1").await {
        Err(ConnectError::Unrecoverable(msg)) => assert!(msg.contains("reconnect")),
        other => panic!("Expected Unrecoverable, got {other:?}"),
    }
    // Zero provider calls: the stale token is not refreshable.
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_failure_never_returns_stale_token() {
    let provider = spawn_mock_provider().await;
    provider.state.fail_refresh.store(true, Ordering::SeqCst);
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    store
        .upsert_connection(seeded_connection("conn-1", true, true))
        .await
        .unwrap();

    match manager.get_usable_access_token("conn-1").await {
        Err(ConnectError::RefreshFailed(msg)) => assert!(msg.contains("invalid_grant")),
        other => panic!("Expected RefreshFailed, got {other:?}"),
    }

    // The stored (stale) token is untouched.
    let connection = store.get_connection("conn-1").await.unwrap().unwrap();
    assert_eq!(
        cipher().decrypt(connection.access_token.as_deref().unwrap()).unwrap(),
        "T-old"
    );
}

#[tokio::test]
async fn test_inactive_connection_never_mints_tokens() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let mut connection = seeded_connection("conn-1", false, true);
    connection.is_active = false;
    store.upsert_connection(connection).await.unwrap();

    assert!(matches!(
        manager.get_usable_access_token("conn-1").await,
        Err(ConnectError::Unrecoverable(_))
    ));
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_connection_is_not_found() {
    let provider = spawn_mock_provider().await;
    let manager = manager_for(&provider.base_url, Arc::new(MemoryConnectionStore::new()));

    assert!(matches!(
        manager.get_usable_access_token("no-such-id").await,
        Err(ConnectError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_connection_without_access_token_reports_no_credential() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let mut connection = seeded_connection("conn-1", false, false);
    connection.access_token = None;
    store.upsert_connection(connection).await.unwrap();

    assert!(matches!(
        manager.get_usable_access_token("conn-1").await,
        Err(ConnectError::NoCredential)
    ));
}

#[tokio::test]
async fn test_concurrent_accessors_share_a_single_refresh() {
    let provider = spawn_mock_provider().await;
    provider.state.refresh_delay_ms.store(50, Ordering::SeqCst);
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = Arc::new(manager_for(&provider.base_url, store.clone()));

    store
        .upsert_connection(seeded_connection("conn-1", true, true))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_usable_access_token("conn-1").await })
        })
        .collect();

    let mut tokens = Vec::new();
    for task in tasks {
        tokens.push(task.await.unwrap().unwrap());
    }

    // Exactly one outbound refresh; the losers waited and reused the result.
    assert_eq!(provider.state.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(tokens.iter().all(|t| t == "T-refreshed-1"));
}

#[tokio::test]
async fn test_disconnect_hard_deletes_and_audits() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let outcome = manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .unwrap();

    manager.disconnect("u1", &outcome.connection_id).await.unwrap();

    assert!(
        store
            .get_connection(&outcome.connection_id)
            .await
            .unwrap()
            .is_none()
    );
    let activities = store.activities_for_user("u1", 10).await.unwrap();
    assert!(
        activities
            .iter()
            .any(|a| a.activity_type == ACTIVITY_OAUTH_DISCONNECTED)
    );

    // A second disconnect, or another user's attempt, reads as not found.
    assert!(matches!(
        manager.disconnect("u1", &outcome.connection_id).await,
        Err(ConnectError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_disconnect_rejects_foreign_connection() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    let outcome = manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .unwrap();

    assert!(matches!(
        manager.disconnect("intruder", &outcome.connection_id).await,
        Err(ConnectError::NotFound(_))
    ));
    assert!(
        store
            .get_connection(&outcome.connection_id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_listed_connections_are_sanitized() {
    let provider = spawn_mock_provider().await;
    let store = Arc::new(MemoryConnectionStore::new());
    let manager = manager_for(&provider.base_url, store.clone());

    manager
        .handle_callback(callback_query("code-1", &signed_state("u1")))
        .await
        .unwrap();

    let summaries = manager.list_connections("u1").await.unwrap();
    assert_eq!(summaries.len(), 1);

    let json = serde_json::to_string(&summaries).unwrap();
    assert!(!json.contains("accessToken"));
    assert!(!json.contains("refreshToken"));

    // Neither the ciphertext blob nor the plaintext token leaks.
    let stored = &store.get_connections_for_user("u1").await.unwrap()[0];
    assert!(!json.contains(stored.access_token.as_deref().unwrap()));
    assert!(!json.contains("\"T\""));
}
