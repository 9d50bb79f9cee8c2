use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Activity, Connection, NewActivity, TokenUpdate};

mod memory;
mod postgres;
mod sqlite;

pub use memory::MemoryConnectionStore;
pub use postgres::PostgresConnectionStore;
pub use sqlite::SqliteConnectionStore;

pub(crate) const DB_TABLE_CONNECTIONS: &str = "oauth_connections";
pub(crate) const DB_TABLE_ACTIVITIES: &str = "activities";

#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Persistence boundary for connections and the audit feed.
///
/// The manager takes this as an injected `Arc<dyn ConnectionStore>`, so the
/// relational backends and the in-memory test double are interchangeable.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Create tables/indexes as needed. Idempotent.
    async fn init(&self) -> Result<(), StorageError>;

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, StorageError>;

    async fn get_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, StorageError>;

    async fn get_connection_by_user_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Connection>, StorageError>;

    /// Insert or replace the connection for `(user_id, platform)`. When a
    /// row already exists its id and `created_at` are preserved; everything
    /// else is overwritten. An empty incoming id is assigned a fresh UUID.
    async fn upsert_connection(&self, connection: Connection)
    -> Result<Connection, StorageError>;

    /// Write refreshed token material. Returns `false` (and writes nothing)
    /// when the row no longer exists, so a refresh racing a disconnect can
    /// never resurrect a deleted connection.
    async fn update_tokens(&self, id: &str, update: TokenUpdate) -> Result<bool, StorageError>;

    /// Hard delete. Returns `false` when the row was already gone.
    async fn delete_connection(&self, id: &str) -> Result<bool, StorageError>;

    async fn record_activity(&self, activity: NewActivity) -> Result<Activity, StorageError>;

    async fn activities_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Activity>, StorageError>;
}
