use crate::core::assistant::{SecretStore, SecretStoreError};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

/// User properties kept in a local SQLite file.
pub struct SqliteSecretStore {
    pool: Pool<Sqlite>,
}

impl SqliteSecretStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), SecretStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_properties (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SecretStoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for SqliteSecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let row = sqlx::query("SELECT value FROM user_properties WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SecretStoreError::Storage(e.to_string()))?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_properties (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| SecretStoreError::Storage(e.to_string()))?;
        Ok(())
    }
}
