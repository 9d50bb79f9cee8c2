use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::config::ConnectConfig;
use crate::crypto::TokenCipher;
use crate::errors::ConnectError;
use crate::registry::ProviderRegistry;
use crate::state::StateSigner;
use crate::storage::ConnectionStore;
use crate::types::{ACTIVITY_OAUTH_DISCONNECTED, Activity, ConnectionSummary, NewActivity};

mod authorize;
mod callback;
mod http;
mod token;

pub use callback::{CallbackOutcome, CallbackQuery};

/// Per-connection refresh leases. The lease for a connection id must be held
/// across the whole check-expiry/refresh/persist sequence so that at most
/// one refresh per connection is ever in flight in this process.
#[derive(Default)]
struct RefreshLeases {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RefreshLeases {
    async fn lease(&self, connection_id: &str) -> Arc<Mutex<()>> {
        let mut leases = self.inner.lock().await;
        leases
            .entry(connection_id.to_string())
            .or_default()
            .clone()
    }
}

/// Orchestrates the OAuth connection lifecycle: authorization URLs, callback
/// handling, encrypted persistence, and transparent token refresh.
///
/// All collaborators are injected; construct with [`ConnectionManager::new`]
/// for tests (fake registry endpoints, in-memory store) or
/// [`ConnectionManager::from_config`] for production wiring.
pub struct ConnectionManager {
    store: Arc<dyn ConnectionStore>,
    registry: ProviderRegistry,
    cipher: TokenCipher,
    signer: StateSigner,
    http: reqwest::Client,
    leases: RefreshLeases,
}

impl ConnectionManager {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        registry: ProviderRegistry,
        cipher: TokenCipher,
        signer: StateSigner,
    ) -> Self {
        Self {
            store,
            registry,
            cipher,
            signer,
            http: http::build_client(),
            leases: RefreshLeases::default(),
        }
    }

    pub fn from_config(
        config: &ConnectConfig,
        store: Arc<dyn ConnectionStore>,
    ) -> Result<Self, ConnectError> {
        let cipher = TokenCipher::new(config.encryption_key())?;
        Ok(Self::new(
            store,
            ProviderRegistry::from_config(config),
            cipher,
            StateSigner::new(config.state_secret()),
        ))
    }

    /// Sanitized connection list for the dashboard. Token ciphertext never
    /// leaves the server.
    pub async fn list_connections(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConnectionSummary>, ConnectError> {
        let connections = self.store.get_connections_for_user(user_id).await?;
        Ok(connections.iter().map(ConnectionSummary::from).collect())
    }

    /// User-initiated disconnect: hard delete plus an audit record. Another
    /// user's connection id is reported as not found rather than forbidden.
    pub async fn disconnect(&self, user_id: &str, connection_id: &str) -> Result<(), ConnectError> {
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| ConnectError::NotFound(connection_id.to_string()))?;

        if self.store.delete_connection(connection_id).await? {
            self.store
                .record_activity(NewActivity {
                    user_id: user_id.to_string(),
                    activity_type: ACTIVITY_OAUTH_DISCONNECTED.to_string(),
                    title: format!("Disconnected {}", connection.platform),
                    description: None,
                    metadata: json!({
                        "platform": connection.platform,
                        "platform_user_id": connection.platform_user_id,
                    }),
                })
                .await?;
            tracing::info!(
                user_id,
                connection_id,
                platform = %connection.platform,
                "connection disconnected"
            );
        }
        Ok(())
    }

    pub async fn recent_activities(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Activity>, ConnectError> {
        Ok(self.store.activities_for_user(user_id, limit).await?)
    }
}
