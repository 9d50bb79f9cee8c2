use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConnectConfig;
use crate::errors::ConnectError;

/// Path appended to the public base URL; every provider redirects here and
/// the `state` parameter disambiguates the originating flow.
pub(crate) const CALLBACK_PATH: &str = "/api/oauth/callback";

/// The platforms a dashboard user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Google,
    Facebook,
    Instagram,
    Whatsapp,
    Telegram,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Google,
        Platform::Facebook,
        Platform::Instagram,
        Platform::Whatsapp,
        Platform::Telegram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
        }
    }

    /// Prefix for the platform's credential environment variables
    /// (`GOOGLE_CLIENT_ID`, `FACEBOOK_CLIENT_SECRET`, ...).
    pub(crate) fn env_prefix(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
            Self::Facebook => "FACEBOOK",
            Self::Instagram => "INSTAGRAM",
            Self::Whatsapp => "WHATSAPP",
            Self::Telegram => "TELEGRAM",
        }
    }

    /// Facebook-family platforms share Meta's numeric app-id convention.
    fn is_facebook_family(&self) -> bool {
        matches!(self, Self::Facebook | Self::Instagram | Self::Whatsapp)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConnectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "whatsapp" => Ok(Self::Whatsapp),
            "telegram" => Ok(Self::Telegram),
            _ => Err(ConnectError::UnsupportedPlatform(s.to_string())),
        }
    }
}

/// Everything needed to drive one provider's authorization-code flow.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    /// Provider-specific authorization parameters, e.g. the offline-access
    /// and forced-consent pair Google needs before it will issue a refresh
    /// token on repeat authorizations.
    pub extra_auth_params: Vec<(&'static str, &'static str)>,
}

/// Registry of provider configurations, built once at startup.
///
/// Constructed from [`ConnectConfig`] rather than read from hidden globals
/// so tests can swap in fake endpoints via [`ProviderRegistry::with_provider`].
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, ProviderConfig>,
}

impl ProviderRegistry {
    /// Build the full registry from configuration. Endpoints and scopes come
    /// from per-provider defaults; credentials from the environment-supplied
    /// config. Credentials are not validated here - that happens lazily at
    /// first use of each platform.
    pub fn from_config(config: &ConnectConfig) -> Self {
        let redirect_uri = format!(
            "{}{}",
            config.public_base_url.trim_end_matches('/'),
            CALLBACK_PATH
        );

        let mut providers = HashMap::new();
        for platform in Platform::ALL {
            let creds = config.credentials_for(platform);
            let defaults = provider_defaults(platform);
            providers.insert(
                platform,
                ProviderConfig {
                    client_id: creds.client_id.clone(),
                    client_secret: creds.client_secret.clone(),
                    redirect_uri: redirect_uri.clone(),
                    scopes: defaults.scopes.iter().map(|s| s.to_string()).collect(),
                    auth_endpoint: defaults.auth_endpoint.to_string(),
                    token_endpoint: defaults.token_endpoint.to_string(),
                    userinfo_endpoint: defaults.userinfo_endpoint.to_string(),
                    extra_auth_params: defaults.extra_auth_params.to_vec(),
                },
            );
        }
        Self { providers }
    }

    /// Register or replace a single provider entry. Used by tests to point a
    /// platform at a mock authorization server.
    pub fn with_provider(mut self, platform: Platform, config: ProviderConfig) -> Self {
        self.providers.insert(platform, config);
        self
    }

    pub fn config_for(&self, platform: Platform) -> Result<&ProviderConfig, ConnectError> {
        self.providers
            .get(&platform)
            .ok_or_else(|| ConnectError::UnsupportedPlatform(platform.to_string()))
    }

    /// Registry lookup plus the credential checks deferred from startup:
    /// both client credentials non-empty, and a numeric app id for the
    /// Facebook family.
    pub fn validated_config_for(&self, platform: Platform) -> Result<&ProviderConfig, ConnectError> {
        let config = self.config_for(platform)?;

        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(ConnectError::MisconfiguredProvider(format!(
                "missing client credentials for {platform}"
            )));
        }

        if platform.is_facebook_family() && !config.client_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConnectError::MisconfiguredProvider(format!(
                "{platform} app id must be numeric"
            )));
        }

        Ok(config)
    }
}

struct ProviderDefaults {
    auth_endpoint: &'static str,
    token_endpoint: &'static str,
    userinfo_endpoint: &'static str,
    scopes: &'static [&'static str],
    extra_auth_params: &'static [(&'static str, &'static str)],
}

fn provider_defaults(platform: Platform) -> ProviderDefaults {
    match platform {
        Platform::Google => ProviderDefaults {
            auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth",
            token_endpoint: "https://oauth2.googleapis.com/token",
            userinfo_endpoint: "https://www.googleapis.com/oauth2/v2/userinfo",
            scopes: &["openid", "email", "profile"],
            extra_auth_params: &[("access_type", "offline"), ("prompt", "consent")],
        },
        Platform::Facebook => ProviderDefaults {
            auth_endpoint: "https://www.facebook.com/v18.0/dialog/oauth",
            token_endpoint: "https://graph.facebook.com/v18.0/oauth/access_token",
            userinfo_endpoint: "https://graph.facebook.com/v18.0/me?fields=id,name,email",
            scopes: &["email", "public_profile", "pages_show_list", "pages_manage_posts"],
            extra_auth_params: &[("auth_type", "rerequest")],
        },
        Platform::Instagram => ProviderDefaults {
            auth_endpoint: "https://api.instagram.com/oauth/authorize",
            token_endpoint: "https://api.instagram.com/oauth/access_token",
            userinfo_endpoint: "https://graph.instagram.com/me?fields=id,username",
            scopes: &["user_profile", "user_media"],
            extra_auth_params: &[("auth_type", "rerequest")],
        },
        Platform::Whatsapp => ProviderDefaults {
            auth_endpoint: "https://www.facebook.com/v18.0/dialog/oauth",
            token_endpoint: "https://graph.facebook.com/v18.0/oauth/access_token",
            userinfo_endpoint: "https://graph.facebook.com/v18.0/me?fields=id,name",
            scopes: &[
                "whatsapp_business_management",
                "whatsapp_business_messaging",
            ],
            extra_auth_params: &[("auth_type", "rerequest")],
        },
        Platform::Telegram => ProviderDefaults {
            auth_endpoint: "https://oauth.telegram.org/auth",
            token_endpoint: "https://oauth.telegram.org/access_token",
            userinfo_endpoint: "https://oauth.telegram.org/userinfo",
            scopes: &["basic"],
            extra_auth_params: &[],
        },
    }
}
