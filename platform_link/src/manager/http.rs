use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConnectError;
use crate::registry::ProviderConfig;

/// Token endpoint response, shared by the authorization-code and
/// refresh-token grants.
#[derive(Debug, Clone, Deserialize)]
pub(super) struct ProviderTokenResponse {
    pub(super) access_token: String,
    pub(super) refresh_token: Option<String>,
    pub(super) expires_in: Option<i64>,
    pub(super) scope: Option<String>,
}

/// Minimal profile from the userinfo endpoint. Providers disagree on field
/// names, so everything is optional; enrichment failure is tolerated by the
/// caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct ProviderProfile {
    pub(super) id: Option<String>,
    #[serde(alias = "username")]
    pub(super) name: Option<String>,
    pub(super) email: Option<String>,
}

/// HTTP client for provider calls. The 30 second timeout bounds hanging
/// token endpoints; a timed-out exchange or refresh surfaces as the
/// corresponding flow error rather than blocking the request task.
pub(super) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(32)
        .build()
        .expect("Failed to create reqwest client")
}

pub(super) async fn exchange_code_for_token(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    code: &str,
) -> Result<ProviderTokenResponse, ConnectError> {
    let response = client
        .post(&provider.token_endpoint)
        .form(&[
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| ConnectError::TokenExchange(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ConnectError::TokenExchange(e.to_string()))?;

    if !status.is_success() {
        tracing::error!("Token endpoint returned {status}: {body}");
        return Err(ConnectError::TokenExchange(format!("{status}: {body}")));
    }

    serde_json::from_str(&body)
        .map_err(|e| ConnectError::TokenExchange(format!("Failed to deserialize response: {e}")))
}

pub(super) async fn refresh_access_token(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    refresh_token: &str,
) -> Result<ProviderTokenResponse, ConnectError> {
    let response = client
        .post(&provider.token_endpoint)
        .form(&[
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| ConnectError::RefreshFailed(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ConnectError::RefreshFailed(e.to_string()))?;

    if !status.is_success() {
        tracing::error!("Refresh grant returned {status}: {body}");
        return Err(ConnectError::RefreshFailed(format!("{status}: {body}")));
    }

    serde_json::from_str(&body)
        .map_err(|e| ConnectError::RefreshFailed(format!("Failed to deserialize response: {e}")))
}

pub(super) async fn fetch_profile(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    access_token: &str,
) -> Result<ProviderProfile, ConnectError> {
    let response = client
        .get(&provider.userinfo_endpoint)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ConnectError::ProfileFetch(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ConnectError::ProfileFetch(e.to_string()))?;

    if !status.is_success() {
        return Err(ConnectError::ProfileFetch(format!("{status}: {body}")));
    }

    serde_json::from_str(&body)
        .map_err(|e| ConnectError::ProfileFetch(format!("Failed to deserialize response: {e}")))
}
