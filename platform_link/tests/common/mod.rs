//! Shared test fixtures: an in-process mock OAuth provider and a manager
//! wired against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{Value, json};

use platform_link::{
    ConnectionManager, MemoryConnectionStore, Platform, ProviderConfig, ProviderRegistry,
    StateSigner, TokenCipher,
};

pub const CIPHER_KEY: [u8; 32] = [9u8; 32];
pub const STATE_SECRET: &[u8] = b"integration-state-secret";

/// Knobs and counters shared with the mock provider's handlers.
#[derive(Clone, Default)]
pub struct MockProviderState {
    pub exchange_calls: Arc<AtomicUsize>,
    pub refresh_calls: Arc<AtomicUsize>,
    pub userinfo_calls: Arc<AtomicUsize>,
    pub fail_refresh: Arc<AtomicBool>,
    pub fail_userinfo: Arc<AtomicBool>,
    pub rotate_refresh_token: Arc<AtomicBool>,
    pub refresh_delay_ms: Arc<AtomicU64>,
}

pub struct MockProvider {
    pub base_url: String,
    pub state: MockProviderState,
}

/// Start a mock provider on an ephemeral port, serving the token and
/// userinfo endpoints the manager talks to.
pub async fn spawn_mock_provider() -> MockProvider {
    let state = MockProviderState::default();
    let app = Router::new()
        .route("/token", post(token_endpoint))
        .route("/userinfo", get(userinfo_endpoint))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock provider");
    let addr = listener.local_addr().expect("mock provider has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock provider died");
    });

    MockProvider {
        base_url: format!("http://{addr}"),
        state,
    }
}

async fn token_endpoint(
    State(state): State<MockProviderState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            state.exchange_calls.fetch_add(1, Ordering::SeqCst);
            if form.get("code").map(String::as_str) == Some("expired-code") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant", "error_description": "code expired"})),
                );
            }
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": "T",
                    "refresh_token": "R",
                    "expires_in": 3600,
                    "scope": "openid email",
                    "token_type": "Bearer"
                })),
            )
        }
        Some("refresh_token") => {
            let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            let call = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if state.fail_refresh.load(Ordering::SeqCst) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant"})),
                );
            }
            let mut body = json!({
                "access_token": format!("T-refreshed-{call}"),
                "expires_in": 3600,
                "token_type": "Bearer"
            });
            if state.rotate_refresh_token.load(Ordering::SeqCst) {
                body["refresh_token"] = json!("R-rotated");
            }
            (StatusCode::OK, Json(body))
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        ),
    }
}

async fn userinfo_endpoint(State(state): State<MockProviderState>) -> (StatusCode, Json<Value>) {
    state.userinfo_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_userinfo.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "userinfo unavailable"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "g-123",
            "name": "Mock User",
            "email": "mock@example.com"
        })),
    )
}

/// Provider entry pointing every endpoint at the mock server.
pub fn mock_provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        client_id: "mock-client".to_string(),
        client_secret: "mock-secret".to_string(),
        redirect_uri: "http://localhost:5000/api/oauth/callback".to_string(),
        scopes: vec!["openid".to_string(), "email".to_string()],
        auth_endpoint: format!("{base_url}/auth"),
        token_endpoint: format!("{base_url}/token"),
        userinfo_endpoint: format!("{base_url}/userinfo"),
        extra_auth_params: vec![("access_type", "offline"), ("prompt", "consent")],
    }
}

/// Manager wired to the mock provider for `google`, backed by the shared
/// in-memory store.
pub fn manager_for(base_url: &str, store: Arc<MemoryConnectionStore>) -> ConnectionManager {
    let registry = ProviderRegistry::default()
        .with_provider(Platform::Google, mock_provider_config(base_url));
    ConnectionManager::new(
        store,
        registry,
        TokenCipher::new(&CIPHER_KEY).expect("test cipher key is 32 bytes"),
        StateSigner::new(STATE_SECRET),
    )
}

pub fn cipher() -> TokenCipher {
    TokenCipher::new(&CIPHER_KEY).expect("test cipher key is 32 bytes")
}

pub fn signer() -> StateSigner {
    StateSigner::new(STATE_SECRET)
}
