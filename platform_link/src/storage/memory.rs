use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{Activity, Connection, NewActivity, TokenUpdate};

use super::{ConnectionStore, StorageError};

/// In-memory store for tests and demos. Not durable.
#[derive(Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<HashMap<String, Connection>>,
    activities: RwLock<Vec<Activity>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, StorageError> {
        Ok(self.connections.read().await.get(id).cloned())
    }

    async fn get_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, StorageError> {
        let mut connections: Vec<Connection> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        connections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(connections)
    }

    async fn get_connection_by_user_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Connection>, StorageError> {
        Ok(self
            .connections
            .read()
            .await
            .values()
            .find(|c| c.user_id == user_id && c.platform == platform)
            .cloned())
    }

    async fn upsert_connection(
        &self,
        mut connection: Connection,
    ) -> Result<Connection, StorageError> {
        let mut connections = self.connections.write().await;

        let existing = connections
            .values()
            .find(|c| c.user_id == connection.user_id && c.platform == connection.platform)
            .cloned();

        match existing {
            Some(existing) => {
                connection.id = existing.id.clone();
                connection.created_at = existing.created_at;
            }
            None if connection.id.is_empty() => {
                connection.id = uuid::Uuid::new_v4().to_string();
            }
            None => {}
        }

        connections.insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    async fn update_tokens(&self, id: &str, update: TokenUpdate) -> Result<bool, StorageError> {
        let mut connections = self.connections.write().await;
        let Some(connection) = connections.get_mut(id) else {
            return Ok(false);
        };

        connection.access_token = Some(update.access_token);
        if let Some(refresh_token) = update.refresh_token {
            connection.refresh_token = Some(refresh_token);
        }
        connection.token_expiry = update.token_expiry;
        connection.last_sync = Some(update.last_sync);
        connection.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_connection(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.connections.write().await.remove(id).is_some())
    }

    async fn record_activity(&self, activity: NewActivity) -> Result<Activity, StorageError> {
        let record = Activity {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: activity.user_id,
            activity_type: activity.activity_type,
            title: activity.title,
            description: activity.description,
            metadata: activity.metadata,
            created_at: Utc::now(),
        };
        self.activities.write().await.push(record.clone());
        Ok(record)
    }

    async fn activities_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Activity>, StorageError> {
        let activities = self.activities.read().await;
        let mut matching: Vec<Activity> = activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}
