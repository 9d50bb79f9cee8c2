use chrono::{Duration, Utc};

use crate::errors::ConnectError;
use crate::registry::Platform;
use crate::types::{Connection, TokenUpdate};

use super::http::refresh_access_token;
use super::ConnectionManager;

impl ConnectionManager {
    /// Return a plaintext access token that is currently usable, refreshing
    /// it first when expired. The token is decrypted on the way out and is
    /// never persisted or logged in plaintext.
    ///
    /// Safe to call concurrently for the same connection: the refresh runs
    /// under a per-connection lease, and racers re-read the stored record
    /// after acquiring it, so at most one provider refresh happens per
    /// expiry.
    pub async fn get_usable_access_token(
        &self,
        connection_id: &str,
    ) -> Result<String, ConnectError> {
        let connection = self.load_usable(connection_id).await?;

        if !connection.is_expired(Utc::now()) {
            let ciphertext = connection.access_token.as_deref().ok_or(ConnectError::NoCredential)?;
            return Ok(self.cipher.decrypt(ciphertext)?);
        }

        let lease = self.leases.lease(connection_id).await;
        let _guard = lease.lock().await;

        // Re-read under the lease: a concurrent caller may have refreshed
        // while this task waited, in which case its token is reused as-is.
        let connection = self.load_usable(connection_id).await?;
        if !connection.is_expired(Utc::now()) {
            let ciphertext = connection.access_token.as_deref().ok_or(ConnectError::NoCredential)?;
            return Ok(self.cipher.decrypt(ciphertext)?);
        }

        self.refresh_connection(&connection).await
    }

    /// Load a connection and apply the gating checks that precede any token
    /// use: existence, the soft-disable flag, and credential presence.
    async fn load_usable(&self, connection_id: &str) -> Result<Connection, ConnectError> {
        let connection = self
            .store
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| ConnectError::NotFound(connection_id.to_string()))?;

        if !connection.is_active {
            return Err(ConnectError::Unrecoverable(
                "connection is disabled; reconnect required".to_string(),
            ));
        }
        if connection.access_token.is_none() {
            return Err(ConnectError::NoCredential);
        }
        Ok(connection)
    }

    /// Run the refresh-token grant and persist the rotated credentials.
    /// Must only be called with the connection's lease held.
    async fn refresh_connection(&self, connection: &Connection) -> Result<String, ConnectError> {
        let Some(refresh_ciphertext) = connection.refresh_token.as_deref() else {
            return Err(ConnectError::Unrecoverable(
                "access token expired and no refresh token was granted; reconnect required"
                    .to_string(),
            )
            .log());
        };

        let platform: Platform = connection.platform.parse()?;
        let provider = self.registry.validated_config_for(platform)?;

        let refresh_token = self.cipher.decrypt(refresh_ciphertext)?;
        let token = refresh_access_token(&self.http, provider, &refresh_token).await?;

        let access_ciphertext = self.cipher.encrypt(&token.access_token)?;
        // Keep the stored refresh token unless the provider rotated it.
        let rotated_ciphertext = token
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        let now = Utc::now();
        let persisted = self
            .store
            .update_tokens(
                &connection.id,
                TokenUpdate {
                    access_token: access_ciphertext,
                    refresh_token: rotated_ciphertext,
                    token_expiry: token.expires_in.map(|s| now + Duration::seconds(s)),
                    last_sync: now,
                },
            )
            .await?;

        if persisted {
            tracing::debug!(
                connection_id = %connection.id,
                %platform,
                rotated = token.refresh_token.is_some(),
                "access token refreshed"
            );
        } else {
            // The connection was disconnected while the refresh was in
            // flight; dropping the write keeps the deleted row deleted.
            tracing::warn!(
                connection_id = %connection.id,
                "connection deleted during refresh; discarding rotated tokens"
            );
        }

        Ok(token.access_token)
    }
}
