use url::Url;

use crate::errors::ConnectError;
use crate::registry::Platform;
use crate::state::AuthState;

use super::ConnectionManager;

impl ConnectionManager {
    /// Build the provider's authorization URL for a user-initiated connect.
    ///
    /// Nothing is persisted here: the signed `state` embedded in the URL
    /// carries everything the callback needs to resume the flow.
    pub fn begin_authorization(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<String, ConnectError> {
        let platform: Platform = platform.parse()?;
        let provider = self.registry.validated_config_for(platform)?;

        let state = self.signer.sign(&AuthState::issue(user_id, platform));

        let mut url = Url::parse(&provider.auth_endpoint).map_err(|e| {
            ConnectError::MisconfiguredProvider(format!(
                "invalid authorization endpoint for {platform}: {e}"
            ))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &provider.client_id)
                .append_pair("redirect_uri", &provider.redirect_uri)
                .append_pair("scope", &provider.scopes.join(" "))
                .append_pair("response_type", "code")
                .append_pair("state", &state);
            // Offline-access / re-consent extras so refresh-capable providers
            // actually issue a refresh token on repeat authorizations.
            for (key, value) in &provider.extra_auth_params {
                pairs.append_pair(key, value);
            }
        }

        tracing::debug!(user_id, %platform, "prepared authorization URL");
        Ok(url.to_string())
    }
}
