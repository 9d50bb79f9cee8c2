use thiserror::Error;

use crate::crypto::CipherError;
use crate::storage::StorageError;

/// Errors that can occur across the connection lifecycle
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Provider misconfigured: {0}")]
    MisconfiguredProvider(String),

    #[error("Provider denied authorization: {0}")]
    ProviderDenied(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Fetching user profile failed: {0}")]
    ProfileFetch(String),

    #[error("Connection unusable: {0}")]
    Unrecoverable(String),

    #[error("No credential stored for connection")]
    NoCredential,

    #[error("Connection not found: {0}")]
    NotFound(String),

    /// Error from cipher operations
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Error from the connection store
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ConnectError {
    /// Log the error at a severity matching its class and return self,
    /// allowing method chaining at the point the error is surfaced.
    pub fn log(self) -> Self {
        match &self {
            Self::UnsupportedPlatform(p) => tracing::warn!("Unsupported platform: {}", p),
            Self::MisconfiguredProvider(msg) => tracing::error!("Provider misconfigured: {}", msg),
            Self::ProviderDenied(msg) => tracing::info!("Provider denied authorization: {}", msg),
            Self::InvalidCallback(msg) => tracing::warn!("Invalid callback: {}", msg),
            Self::TokenExchange(msg) => tracing::error!("Token exchange failed: {}", msg),
            Self::RefreshFailed(msg) => tracing::error!("Token refresh failed: {}", msg),
            Self::ProfileFetch(msg) => tracing::warn!("Fetching user profile failed: {}", msg),
            Self::Unrecoverable(msg) => tracing::warn!("Connection unusable: {}", msg),
            Self::NoCredential => tracing::warn!("No credential stored for connection"),
            Self::NotFound(id) => tracing::warn!("Connection not found: {}", id),
            Self::Cipher(err) => tracing::error!("Cipher error: {}", err),
            Self::Storage(err) => tracing::error!("Storage error: {}", err),
        }
        self
    }
}
