//! Storage abstraction for the vault substrate
//!
//! The vault only needs an ordered key→blob store with put/list/delete, plus
//! a small table of named slots (validation token, notification state).
//! Backends: in-memory here, SQLite in [`crate::sqlite_storage`].

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Identifier of a stored record
///
/// New records get a random UUID. Ids written by older releases are arbitrary
/// strings and are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Fresh random 128-bit identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored pair: id plus the serialized envelope, opaque at this layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub id: RecordId,
    pub envelope: String,
}

/// Storage trait for the vault backend
#[async_trait]
pub trait VaultStorage: Send + Sync {
    /// Insert or overwrite the blob stored under `id`
    async fn put_record(&self, id: &RecordId, blob: &str) -> Result<()>;

    /// All stored records, in backend-defined order
    async fn list_records(&self) -> Result<Vec<VaultRecord>>;

    /// Remove a record. Missing ids are not an error.
    async fn delete_record(&self, id: &RecordId) -> Result<()>;

    /// Read a named slot
    async fn get_slot(&self, key: &str) -> Result<Option<String>>;

    /// Write a named slot, overwriting any previous value
    async fn put_slot(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a named slot. Missing slots are not an error.
    async fn delete_slot(&self, key: &str) -> Result<()>;
}

/// In-memory implementation of VaultStorage
///
/// Suitable for development and testing.
/// Data is lost when the process terminates.
pub struct InMemoryStorage {
    records: RwLock<HashMap<RecordId, String>>,
    slots: RwLock<HashMap<String, String>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultStorage for InMemoryStorage {
    async fn put_record(&self, id: &RecordId, blob: &str) -> Result<()> {
        self.records.write().insert(id.clone(), blob.to_string());
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<VaultRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .map(|(id, envelope)| VaultRecord {
                id: id.clone(),
                envelope: envelope.clone(),
            })
            .collect())
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    async fn get_slot(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    async fn put_slot(&self, key: &str, value: &str) -> Result<()> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_slot(&self, key: &str) -> Result<()> {
        self.slots.write().remove(key);
        Ok(())
    }
}
