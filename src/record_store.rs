//! Record store: CRUD over id → envelope pairs
//!
//! Envelopes are opaque here. The `create`/`update` helpers seal a plaintext
//! field map first and then go through `save` like any other caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::envelope::{Envelope, EnvelopeCodec};
use crate::error::Result;
use crate::storage::{RecordId, VaultRecord, VaultStorage};

/// Arbitrary record payload
pub type RecordFields = Map<String, Value>;

/// A decrypted record, reassembled with its id. Lives only in memory.
///
/// Serializes flat: `{"id": "...", "title": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaintextRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: RecordFields,
}

impl PlaintextRecord {
    /// Rebuild a record from decrypted JSON. The payload must be an object.
    pub fn from_plaintext(id: RecordId, plaintext: &str) -> Result<Self> {
        let mut fields: RecordFields = serde_json::from_str(plaintext)?;
        fields.remove("id");
        Ok(Self { id, fields })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Seal a field map under `password`. Any `id` key is dropped: identity
/// belongs to the stored pair, not the payload.
pub async fn seal_fields(fields: &RecordFields, password: &str) -> Result<Envelope> {
    let mut payload = fields.clone();
    payload.remove("id");
    let plaintext = serde_json::to_string(&payload)?;

    EnvelopeCodec::encrypt_async(plaintext, Zeroizing::new(password.to_string())).await
}

pub struct RecordStore<S: VaultStorage> {
    storage: Arc<S>,
}

impl<S: VaultStorage> Clone for RecordStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: VaultStorage> RecordStore<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Insert or overwrite the envelope stored under `id`
    pub async fn save(&self, id: &RecordId, envelope: &Envelope) -> Result<()> {
        self.storage.put_record(id, &envelope.to_json()?).await?;
        tracing::debug!(%id, "record saved");
        Ok(())
    }

    /// Every stored pair, order unspecified
    pub async fn get_all(&self) -> Result<Vec<VaultRecord>> {
        self.storage.list_records().await
    }

    /// Remove a record; deleting an unknown id is a no-op
    pub async fn delete(&self, id: &RecordId) -> Result<()> {
        self.storage.delete_record(id).await?;
        tracing::debug!(%id, "record deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.storage.list_records().await?.len())
    }

    /// Seal `fields` and store them under a fresh id
    pub async fn create(&self, fields: &RecordFields, password: &str) -> Result<RecordId> {
        let envelope = seal_fields(fields, password).await?;
        let id = RecordId::generate();
        self.save(&id, &envelope).await?;
        Ok(id)
    }

    /// Re-seal `fields` in place; the id survives the edit
    pub async fn update(&self, id: &RecordId, fields: &RecordFields, password: &str) -> Result<()> {
        let envelope = seal_fields(fields, password).await?;
        self.save(id, &envelope).await
    }
}
