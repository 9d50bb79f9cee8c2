use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::errors::ConnectError;
use crate::registry::Platform;
use crate::types::{ACTIVITY_OAUTH_CONNECTED, Connection, NewActivity};

use super::http::{ProviderProfile, exchange_code_for_token, fetch_profile};
use super::ConnectionManager;

/// Query parameters a provider sends to the shared callback endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a completed callback, used to build the browser redirect.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub platform: Platform,
    pub connection_id: String,
}

impl ConnectionManager {
    /// Consume the provider redirect: validate state, exchange the code,
    /// enrich with profile data, persist the encrypted connection, and
    /// record the audit activity.
    ///
    /// Authorization codes are single-use at the provider, so a replayed
    /// callback fails at the exchange step with `TokenExchange`; no replay
    /// bookkeeping is needed here.
    pub async fn handle_callback(
        &self,
        query: CallbackQuery,
    ) -> Result<CallbackOutcome, ConnectError> {
        // 1. Receive: a present `error` means the user declined consent.
        if let Some(error) = query.error.as_deref().filter(|e| !e.is_empty()) {
            let detail = match query.error_description.as_deref() {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            };
            return Err(ConnectError::ProviderDenied(detail).log());
        }

        // 2. Validate: both parameters present, state signature intact.
        let code = query
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConnectError::InvalidCallback("missing authorization code".to_string()))?;
        let state = query
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConnectError::InvalidCallback("missing state".to_string()))?;
        let auth_state = self.signer.verify(state)?;
        let platform = auth_state.platform;
        let provider = self.registry.validated_config_for(platform)?;

        // 3. Exchange the single-use code for tokens.
        let token = exchange_code_for_token(&self.http, provider, code).await?;

        // 4. Enrich: profile failure must not abort the connection.
        let profile = match fetch_profile(&self.http, provider, &token.access_token).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(
                    %platform,
                    error = %e,
                    "userinfo fetch failed; storing connection without profile"
                );
                ProviderProfile::default()
            }
        };

        // 5. Persist with both tokens encrypted independently.
        let access_token = self.cipher.encrypt(&token.access_token)?;
        let refresh_token = token
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.encrypt(t))
            .transpose()?;

        let now = Utc::now();
        let connection = Connection {
            id: String::new(),
            user_id: auth_state.user_id.clone(),
            platform: platform.as_str().to_string(),
            platform_user_id: profile.id.clone(),
            display_name: profile.name.clone(),
            email: profile.email.clone(),
            access_token: Some(access_token),
            refresh_token,
            token_expiry: token.expires_in.map(|s| now + Duration::seconds(s)),
            scope: token.scope.clone().or_else(|| Some(provider.scopes.join(" "))),
            is_active: true,
            last_sync: Some(now),
            created_at: now,
            updated_at: now,
        };
        let stored = self.store.upsert_connection(connection).await?;

        // 6. Notify the activity feed.
        self.store
            .record_activity(NewActivity {
                user_id: auth_state.user_id.clone(),
                activity_type: ACTIVITY_OAUTH_CONNECTED.to_string(),
                title: format!("Connected {platform}"),
                description: profile.name.clone(),
                metadata: json!({
                    "platform": platform.as_str(),
                    "platform_user_id": profile.id,
                }),
            })
            .await?;

        tracing::info!(
            user_id = %auth_state.user_id,
            %platform,
            connection_id = %stored.id,
            "oauth connection established"
        );

        Ok(CallbackOutcome {
            platform,
            connection_id: stored.id,
        })
    }
}
