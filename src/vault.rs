use std::sync::Arc;

use crate::backup::BackupService;
use crate::batch_loader::BatchLoader;
use crate::config::VaultConfig;
use crate::error::Result;
use crate::notifications::{NotificationPreferences, NotificationStateStore};
use crate::password_gate::PasswordGate;
use crate::record_store::{RecordFields, RecordStore};
use crate::storage::{RecordId, VaultStorage};

/// All vault components wired to one storage handle
pub struct Vault<S: VaultStorage> {
    gate: PasswordGate<S>,
    store: RecordStore<S>,
    loader: BatchLoader<S>,
    backup: BackupService<S>,
    notifications: NotificationStateStore<S>,
    preferences: NotificationPreferences<S>,
}

impl<S: VaultStorage> Vault<S> {
    pub fn new(storage: Arc<S>) -> Self {
        let store = RecordStore::new(Arc::clone(&storage));
        Self {
            gate: PasswordGate::new(Arc::clone(&storage)),
            loader: BatchLoader::new(store.clone()),
            backup: BackupService::new(store.clone()),
            store,
            notifications: NotificationStateStore::new(Arc::clone(&storage)),
            preferences: NotificationPreferences::new(storage),
        }
    }

    pub fn with_config(storage: Arc<S>, config: &VaultConfig) -> Result<Self> {
        let store = RecordStore::new(Arc::clone(&storage));
        let loader = BatchLoader::with_batch_width(store.clone(), config.batch_width)?;
        let backup = BackupService::with_loader(
            store.clone(),
            BatchLoader::with_batch_width(store.clone(), config.batch_width)?,
        );

        Ok(Self {
            gate: PasswordGate::new(Arc::clone(&storage)),
            store,
            loader,
            backup,
            notifications: NotificationStateStore::new(Arc::clone(&storage)),
            preferences: NotificationPreferences::new(storage),
        })
    }

    pub fn gate(&self) -> &PasswordGate<S> {
        &self.gate
    }

    pub fn records(&self) -> &RecordStore<S> {
        &self.store
    }

    pub fn loader(&self) -> &BatchLoader<S> {
        &self.loader
    }

    pub fn backup(&self) -> &BackupService<S> {
        &self.backup
    }

    /// Stored reminder email
    pub fn preferences(&self) -> &NotificationPreferences<S> {
        &self.preferences
    }

    /// Re-seal an edited record and reset its reminders
    pub async fn update_record(&self, id: &RecordId, fields: &RecordFields, password: &str) -> Result<()> {
        self.store.update(id, fields, password).await?;
        self.notifications.clear(id).await
    }

    /// Delete a record and forget its reminders
    pub async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.store.delete(id).await?;
        self.notifications.clear(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::ExpiryThreshold;
    use crate::storage::InMemoryStorage;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_and_delete_reset_reminders() {
        let storage = Arc::new(InMemoryStorage::new());
        let vault = Vault::new(Arc::clone(&storage));
        let reminders = NotificationStateStore::new(storage);

        let fields = json!({"title": "Insurance", "dueDate": "2026-06-01"});
        let id = vault
            .records()
            .create(fields.as_object().unwrap(), "pw")
            .await
            .unwrap();

        reminders.mark_sent(&id, ExpiryThreshold::SevenDays, Utc::now()).await.unwrap();
        let moved = json!({"title": "Insurance", "dueDate": "2026-09-01"});
        vault.update_record(&id, moved.as_object().unwrap(), "pw").await.unwrap();
        assert!(!reminders.has_been_sent(&id, ExpiryThreshold::SevenDays).await.unwrap());

        reminders.mark_sent(&id, ExpiryThreshold::SevenDays, Utc::now()).await.unwrap();
        vault.delete_record(&id).await.unwrap();
        assert!(!reminders.has_been_sent(&id, ExpiryThreshold::SevenDays).await.unwrap());
        assert_eq!(vault.records().count().await.unwrap(), 0);
    }

    #[test]
    fn test_rejects_zero_batch_width() {
        let config = VaultConfig {
            batch_width: 0,
            ..VaultConfig::default()
        };
        assert!(Vault::with_config(Arc::new(InMemoryStorage::new()), &config).is_err());
    }

    #[tokio::test]
    async fn test_preferences_share_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        let vault = Vault::new(Arc::clone(&storage));
        vault.preferences().save_email("me@example.com").await.unwrap();

        let other = Vault::with_config(storage, &VaultConfig::default()).unwrap();
        assert_eq!(other.preferences().get_email().await.unwrap().as_deref(), Some("me@example.com"));
    }
}
