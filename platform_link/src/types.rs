use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Activity type recorded when a callback completes successfully.
pub const ACTIVITY_OAUTH_CONNECTED: &str = "oauth_connected";

/// Activity type recorded when a user disconnects a platform.
pub const ACTIVITY_OAUTH_DISCONNECTED: &str = "oauth_disconnected";

/// One user's authorization grant with one external platform.
///
/// `access_token` and `refresh_token` hold cipher blobs, never plaintext.
/// This record is internal to the server; [`ConnectionSummary`] is the view
/// that may be serialized to the browser.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub platform_user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub is_active: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Whether the access token must be treated as unusable. A missing
    /// expiry means long-lived: never proactively refreshed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expiry {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }
}

/// Token fields written back after a successful refresh.
///
/// `refresh_token = None` keeps the stored ciphertext (the provider did not
/// rotate); `token_expiry = None` clears the expiry (the provider stopped
/// reporting `expires_in`, so the token is treated as long-lived).
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub last_sync: DateTime<Utc>,
}

/// Dashboard-facing connection state, derived rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Expired,
    Disabled,
    NeverSynced,
}

/// The serializable view of a [`Connection`] with token ciphertext stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub platform_user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub scope: Option<String>,
    pub is_active: bool,
    pub status: ConnectionStatus,
    pub token_expiry: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Connection> for ConnectionSummary {
    fn from(connection: &Connection) -> Self {
        let status = if !connection.is_active {
            ConnectionStatus::Disabled
        } else if connection.last_sync.is_none() {
            ConnectionStatus::NeverSynced
        } else if connection.is_expired(Utc::now()) {
            ConnectionStatus::Expired
        } else {
            ConnectionStatus::Connected
        };

        Self {
            id: connection.id.clone(),
            user_id: connection.user_id.clone(),
            platform: connection.platform.clone(),
            platform_user_id: connection.platform_user_id.clone(),
            display_name: connection.display_name.clone(),
            email: connection.email.clone(),
            scope: connection.scope.clone(),
            is_active: connection.is_active,
            status,
            token_expiry: connection.token_expiry,
            last_sync: connection.last_sync,
            created_at: connection.created_at,
        }
    }
}

/// An audit-feed record shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Payload for recording a new activity; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: String,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub metadata: Value,
}
