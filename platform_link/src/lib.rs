//! platform-link - OAuth connection lifecycle management
//!
//! This crate owns the authorization flows that connect a dashboard user to
//! an external platform (Google, Facebook, Instagram, WhatsApp, Telegram):
//! building authorization URLs, exchanging callback codes for tokens,
//! encrypting credentials at rest, and transparently refreshing expired
//! access tokens before handing them to callers.
//!
//! Persistence is abstracted behind the [`ConnectionStore`] trait so the
//! manager can run against SQLite, Postgres, or the in-memory store used in
//! tests and demos.

mod config;
mod crypto;
mod errors;
mod manager;
mod registry;
mod state;
mod storage;
mod types;

pub use config::{ConfigError, ConnectConfig, PlatformCredentials};
pub use crypto::{CipherError, TokenCipher};
pub use errors::ConnectError;
pub use manager::{CallbackOutcome, CallbackQuery, ConnectionManager};
pub use registry::{Platform, ProviderConfig, ProviderRegistry};
pub use state::{AuthState, StateSigner};
pub use storage::{
    ConnectionStore, MemoryConnectionStore, PostgresConnectionStore, SqliteConnectionStore,
    StorageError,
};
pub use types::{
    ACTIVITY_OAUTH_CONNECTED, ACTIVITY_OAUTH_DISCONNECTED, Activity, Connection,
    ConnectionStatus, ConnectionSummary, NewActivity, TokenUpdate,
};
