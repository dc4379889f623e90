use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{Result, VaultError};
use crate::storage::{RecordId, VaultRecord, VaultStorage};

/// On-device SQLite storage
///
/// Only envelopes ever reach the database:
/// - `vault_records` holds id → serialized envelope
/// - `vault_slots` holds named single values (validation token etc.)
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| VaultError::Config(format!("Invalid database url {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to open database: {}", e)))?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Private in-memory database. Pinned to one connection that never
    /// expires, since every SQLite memory connection is its own database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to open in-memory database: {}", e)))?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if missing
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vault_records (
                id          TEXT PRIMARY KEY,
                envelope    TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("Failed to create vault_records: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vault_slots (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("Failed to create vault_slots: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl VaultStorage for SqliteStorage {
    async fn put_record(&self, id: &RecordId, blob: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vault_records (id, envelope, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET envelope = excluded.envelope, updated_at = excluded.updated_at
            "#,
        )
        .bind(id.as_str())
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("Failed to store record: {}", e)))?;

        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<VaultRecord>> {
        let rows = sqlx::query("SELECT id, envelope FROM vault_records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to list records: {}", e)))?;

        Ok(rows
            .iter()
            .map(|r| VaultRecord {
                id: RecordId::from(r.get::<String, _>("id")),
                envelope: r.get("envelope"),
            })
            .collect())
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        sqlx::query("DELETE FROM vault_records WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to delete record: {}", e)))?;

        Ok(())
    }

    async fn get_slot(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM vault_slots WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to read slot {}: {}", key, e)))?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn put_slot(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vault_slots (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::Storage(format!("Failed to write slot {}: {}", key, e)))?;

        Ok(())
    }

    async fn delete_slot(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM vault_slots WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| VaultError::Storage(format!("Failed to delete slot {}: {}", key, e)))?;

        Ok(())
    }
}
