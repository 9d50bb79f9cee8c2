use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::types::{Activity, Connection, NewActivity, TokenUpdate};

use super::{ConnectionStore, DB_TABLE_ACTIVITIES, DB_TABLE_CONNECTIONS, StorageError};

/// SQLite-backed connection store.
#[derive(Clone)]
pub struct SqliteConnectionStore {
    pool: Pool<Sqlite>,
}

impl SqliteConnectionStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConnectionStore for SqliteConnectionStore {
    async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {DB_TABLE_CONNECTIONS} (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                platform_user_id TEXT,
                display_name TEXT,
                email TEXT,
                access_token TEXT,
                refresh_token TEXT,
                token_expiry TIMESTAMP,
                scope TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                last_sync TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                UNIQUE(user_id, platform)
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{DB_TABLE_CONNECTIONS}_user_id \
             ON {DB_TABLE_CONNECTIONS}(user_id)"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {DB_TABLE_ACTIVITIES} (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                metadata TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn get_connection(&self, id: &str) -> Result<Option<Connection>, StorageError> {
        sqlx::query_as::<_, Connection>(&format!(
            "SELECT * FROM {DB_TABLE_CONNECTIONS} WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))
    }

    async fn get_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, StorageError> {
        sqlx::query_as::<_, Connection>(&format!(
            "SELECT * FROM {DB_TABLE_CONNECTIONS} WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))
    }

    async fn get_connection_by_user_platform(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<Connection>, StorageError> {
        sqlx::query_as::<_, Connection>(&format!(
            "SELECT * FROM {DB_TABLE_CONNECTIONS} WHERE user_id = ? AND platform = ?"
        ))
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))
    }

    async fn upsert_connection(
        &self,
        mut connection: Connection,
    ) -> Result<Connection, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Storage(e.to_string()))?;

        let existing = sqlx::query_as::<_, Connection>(&format!(
            "SELECT * FROM {DB_TABLE_CONNECTIONS} WHERE user_id = ? AND platform = ?"
        ))
        .bind(&connection.user_id)
        .bind(&connection.platform)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        if let Some(existing) = existing {
            connection.id = existing.id;
            connection.created_at = existing.created_at;
            sqlx::query(&format!(
                r#"
                UPDATE {DB_TABLE_CONNECTIONS} SET
                    platform_user_id = ?,
                    display_name = ?,
                    email = ?,
                    access_token = ?,
                    refresh_token = ?,
                    token_expiry = ?,
                    scope = ?,
                    is_active = ?,
                    last_sync = ?,
                    updated_at = ?
                WHERE id = ?
                "#
            ))
            .bind(&connection.platform_user_id)
            .bind(&connection.display_name)
            .bind(&connection.email)
            .bind(&connection.access_token)
            .bind(&connection.refresh_token)
            .bind(connection.token_expiry)
            .bind(&connection.scope)
            .bind(connection.is_active)
            .bind(connection.last_sync)
            .bind(connection.updated_at)
            .bind(&connection.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        } else {
            if connection.id.is_empty() {
                connection.id = uuid::Uuid::new_v4().to_string();
            }
            sqlx::query(&format!(
                r#"
                INSERT INTO {DB_TABLE_CONNECTIONS}
                    (id, user_id, platform, platform_user_id, display_name, email,
                     access_token, refresh_token, token_expiry, scope, is_active,
                     last_sync, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#
            ))
            .bind(&connection.id)
            .bind(&connection.user_id)
            .bind(&connection.platform)
            .bind(&connection.platform_user_id)
            .bind(&connection.display_name)
            .bind(&connection.email)
            .bind(&connection.access_token)
            .bind(&connection.refresh_token)
            .bind(connection.token_expiry)
            .bind(&connection.scope)
            .bind(connection.is_active)
            .bind(connection.last_sync)
            .bind(connection.created_at)
            .bind(connection.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Storage(e.to_string()))?;

        Ok(connection)
    }

    async fn update_tokens(&self, id: &str, update: TokenUpdate) -> Result<bool, StorageError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {DB_TABLE_CONNECTIONS} SET
                access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_expiry = ?,
                last_sync = ?,
                updated_at = ?
            WHERE id = ?
            "#
        ))
        .bind(&update.access_token)
        .bind(&update.refresh_token)
        .bind(update.token_expiry)
        .bind(update.last_sync)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_connection(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(&format!("DELETE FROM {DB_TABLE_CONNECTIONS} WHERE id = ?"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Storage(e.to_string()))?;

        Ok(result.rows_affected() > 0)
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

        sqlx::query(&format!(
            r#"
            INSERT INTO {DB_TABLE_ACTIVITIES}
                (id, user_id, activity_type, title, description, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        ))
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.activity_type)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))?;

        Ok(record)
    }

    async fn activities_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<Activity>, StorageError> {
        sqlx::query_as::<_, Activity>(&format!(
            "SELECT * FROM {DB_TABLE_ACTIVITIES} WHERE user_id = ? \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Storage(e.to_string()))
    }
}
