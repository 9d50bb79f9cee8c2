use std::collections::HashMap;
use std::env;

use thiserror::Error;

use crate::registry::Platform;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("ENCRYPTION_KEY must be 64 hex characters (a 256-bit key): {0}")]
    InvalidEncryptionKey(String),
}

/// OAuth client credentials for one platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Process-level configuration for the connection manager.
///
/// The encryption key and state-signing secret are validated eagerly -
/// starting without them (or with a mis-sized key) is a hard error, never a
/// silent fallback to a derived key. Per-platform client credentials are
/// read here but only validated when the platform is first used.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub public_base_url: String,
    encryption_key: [u8; 32],
    state_secret: Vec<u8>,
    credentials: HashMap<Platform, PlatformCredentials>,
}

impl ConnectConfig {
    pub fn new(
        public_base_url: impl Into<String>,
        encryption_key: [u8; 32],
        state_secret: impl Into<Vec<u8>>,
    ) -> Self {
        let credentials = Platform::ALL
            .into_iter()
            .map(|p| (p, PlatformCredentials::default()))
            .collect();
        Self {
            public_base_url: public_base_url.into(),
            encryption_key,
            state_secret: state_secret.into(),
            credentials,
        }
    }

    /// Load configuration from the environment:
    ///
    /// - `CLIENT_URL` - public base URL the browser is redirected back to
    /// - `ENCRYPTION_KEY` - 64 hex chars, the 256-bit token encryption key
    /// - `SESSION_SECRET` - state-signature secret
    /// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET` and the equivalent
    ///   `FACEBOOK_`, `INSTAGRAM_`, `WHATSAPP_`, `TELEGRAM_` pairs
    pub fn from_env() -> Result<Self, ConfigError> {
        let public_base_url =
            env::var("CLIENT_URL").unwrap_or_else(|_| "http://localhost:5000".to_string());

        let key_hex = env::var("ENCRYPTION_KEY").map_err(|_| {
            tracing::error!("ENCRYPTION_KEY is not set; refusing to start without a token key");
            ConfigError::MissingVar("ENCRYPTION_KEY")
        })?;
        let encryption_key = decode_key(&key_hex)?;

        let state_secret = env::var("SESSION_SECRET")
            .map_err(|_| ConfigError::MissingVar("SESSION_SECRET"))?
            .into_bytes();

        let mut config = Self::new(public_base_url, encryption_key, state_secret);
        for platform in Platform::ALL {
            let prefix = platform.env_prefix();
            config.set_credentials(
                platform,
                PlatformCredentials {
                    client_id: env::var(format!("{prefix}_CLIENT_ID")).unwrap_or_default(),
                    client_secret: env::var(format!("{prefix}_CLIENT_SECRET")).unwrap_or_default(),
                },
            );
        }
        Ok(config)
    }

    pub fn set_credentials(&mut self, platform: Platform, credentials: PlatformCredentials) {
        self.credentials.insert(platform, credentials);
    }

    pub fn credentials_for(&self, platform: Platform) -> &PlatformCredentials {
        self.credentials
            .get(&platform)
            .expect("credentials map is initialized for every platform")
    }

    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.encryption_key
    }

    pub fn state_secret(&self) -> &[u8] {
        &self.state_secret
    }
}

fn decode_key(key_hex: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = hex::decode(key_hex)
        .map_err(|_| ConfigError::InvalidEncryptionKey("not valid hex".to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidEncryptionKey(format!("got {len} bytes, need 32")))
}
