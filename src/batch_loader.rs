//! Batch decryption of the whole vault
//!
//! Records are opened in fixed-width groups: concurrently inside a group,
//! sequentially across groups. Key derivation is expensive on purpose, so the
//! group width bounds how many derivations run at once.
//!
//! A record that does not open under the session password is not an error.
//! Vaults legitimately hold records sealed under older passwords; they show
//! up as [`DecryptOutcome::Skipped`] and are left out of the result.

use futures::future::join_all;
use zeroize::Zeroizing;

use crate::envelope::EnvelopeCodec;
use crate::error::{Result, VaultError};
use crate::record_store::{PlaintextRecord, RecordStore};
use crate::storage::{RecordId, VaultRecord, VaultStorage};

/// Records decrypted concurrently per group
pub const DEFAULT_BATCH_WIDTH: usize = 5;

/// Per-record result of a load
#[derive(Debug)]
pub enum DecryptOutcome {
    Decrypted(PlaintextRecord),
    Skipped { id: RecordId, reason: String },
}

/// Outcomes of one load, in completion order
#[derive(Debug, Default)]
pub struct LoadReport {
    pub outcomes: Vec<DecryptOutcome>,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn decrypted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DecryptOutcome::Decrypted(_)))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.total() - self.decrypted_count()
    }

    /// Ids and reasons of records that did not open
    pub fn skipped(&self) -> impl Iterator<Item = (&RecordId, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            DecryptOutcome::Skipped { id, reason } => Some((id, reason.as_str())),
            DecryptOutcome::Decrypted(_) => None,
        })
    }

    pub fn into_records(self) -> Vec<PlaintextRecord> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                DecryptOutcome::Decrypted(record) => Some(record),
                DecryptOutcome::Skipped { .. } => None,
            })
            .collect()
    }
}

/// Open one stored record under `password`
pub async fn decrypt_record(record: VaultRecord, password: &str) -> Result<PlaintextRecord> {
    let VaultRecord { id, envelope } = record;
    let plaintext =
        EnvelopeCodec::decrypt_json_async(envelope, Zeroizing::new(password.to_string())).await?;
    let plaintext = Zeroizing::new(plaintext);
    PlaintextRecord::from_plaintext(id, &plaintext)
}

async fn decrypt_outcome(record: VaultRecord, password: &str) -> DecryptOutcome {
    let id = record.id.clone();
    match decrypt_record(record, password).await {
        Ok(record) => DecryptOutcome::Decrypted(record),
        Err(e) => {
            tracing::debug!(%id, reason = %e, "record skipped");
            DecryptOutcome::Skipped {
                id,
                reason: e.to_string(),
            }
        }
    }
}

pub struct BatchLoader<S: VaultStorage> {
    store: RecordStore<S>,
    batch_width: usize,
}

impl<S: VaultStorage> BatchLoader<S> {
    pub fn new(store: RecordStore<S>) -> Self {
        Self {
            store,
            batch_width: DEFAULT_BATCH_WIDTH,
        }
    }

    pub fn with_batch_width(store: RecordStore<S>, batch_width: usize) -> Result<Self> {
        if batch_width == 0 {
            return Err(VaultError::Config("Batch width must be at least 1".into()));
        }
        Ok(Self { store, batch_width })
    }

    pub fn batch_width(&self) -> usize {
        self.batch_width
    }

    /// Every record that opens under `password`; the rest are dropped
    pub async fn load_all_decrypted(&self, password: &str) -> Result<Vec<PlaintextRecord>> {
        Ok(self.load_report(password, |_, _| {}).await?.into_records())
    }

    /// Like [`Self::load_all_decrypted`], calling `on_progress(done, total)`
    /// after each group
    pub async fn load_all_decrypted_with_progress<F>(
        &self,
        password: &str,
        on_progress: F,
    ) -> Result<Vec<PlaintextRecord>>
    where
        F: FnMut(usize, usize) + Send,
    {
        Ok(self.load_report(password, on_progress).await?.into_records())
    }

    /// Full per-record outcome of a load.
    ///
    /// Only a failure to list the store is an error. Progress is reported
    /// after every group and reaches `(total, total)` exactly once; an empty
    /// vault reports `(0, 0)`.
    pub async fn load_report<F>(&self, password: &str, on_progress: F) -> Result<LoadReport>
    where
        F: FnMut(usize, usize) + Send,
    {
        let records = self.store.get_all().await?;
        let report = self.decrypt_records(records, password, on_progress).await;

        tracing::info!(
            total = report.total(),
            decrypted = report.decrypted_count(),
            skipped = report.skipped_count(),
            "vault loaded"
        );
        Ok(report)
    }

    /// Open an arbitrary set of pairs in groups of [`Self::batch_width`].
    /// Backups reuse this for archives whose items are sealed one by one.
    pub async fn decrypt_records<F>(
        &self,
        records: Vec<VaultRecord>,
        password: &str,
        mut on_progress: F,
    ) -> LoadReport
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = records.len();
        let mut report = LoadReport {
            outcomes: Vec::with_capacity(total),
        };

        if total == 0 {
            on_progress(0, 0);
            return report;
        }

        let mut done = 0;
        for group in records.chunks(self.batch_width) {
            let outcomes = join_all(
                group
                    .iter()
                    .cloned()
                    .map(|record| decrypt_outcome(record, password)),
            )
            .await;

            report.outcomes.extend(outcomes);
            done += group.len();
            on_progress(done, total);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    async fn store_with(passwords: &[(&str, usize)]) -> RecordStore<InMemoryStorage> {
        store_on(Arc::new(InMemoryStorage::new()), passwords).await
    }

    async fn store_on(
        storage: Arc<InMemoryStorage>,
        passwords: &[(&str, usize)],
    ) -> RecordStore<InMemoryStorage> {
        let store = RecordStore::new(storage);
        for (password, count) in passwords {
            for n in 0..*count {
                let fields = json!({"title": format!("{}-{}", password, n)});
                store
                    .create(fields.as_object().unwrap(), password)
                    .await
                    .unwrap();
            }
        }
        store
    }

    #[tokio::test]
    async fn test_partial_vault_tolerance() {
        let store = store_with(&[("old", 3), ("new", 4)]).await;
        let loader = BatchLoader::new(store);

        let old = loader.load_all_decrypted("old").await.unwrap();
        assert_eq!(old.len(), 3);
        assert!(old.iter().all(|r| r.get_str("title").unwrap().starts_with("old-")));

        let new = loader.load_all_decrypted("new").await.unwrap();
        assert_eq!(new.len(), 4);

        assert!(loader.load_all_decrypted("neither").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_report_counts_skipped() {
        let storage = Arc::new(InMemoryStorage::new());
        let store = store_on(Arc::clone(&storage), &[("a", 2), ("b", 1)]).await;
        storage
            .put_record(&RecordId::from("corrupt"), "{not an envelope")
            .await
            .unwrap();

        let loader = BatchLoader::new(store);
        let report = loader.load_report("a", |_, _| {}).await.unwrap();

        assert_eq!(report.total(), 4);
        assert_eq!(report.decrypted_count(), 2);
        assert_eq!(report.skipped_count(), 2);
        assert!(report.skipped().any(|(id, _)| id.as_str() == "corrupt"));
    }

    #[tokio::test]
    async fn test_progress_reaches_total_once() {
        let store = store_with(&[("pw", 12)]).await;
        let loader = BatchLoader::new(store);

        let mut calls = Vec::new();
        let records = loader
            .load_all_decrypted_with_progress("pw", |done, total| calls.push((done, total)))
            .await
            .unwrap();

        assert_eq!(records.len(), 12);
        assert_eq!(calls, vec![(5, 12), (10, 12), (12, 12)]);
    }

    #[tokio::test]
    async fn test_progress_on_empty_vault() {
        let loader = BatchLoader::new(RecordStore::new(Arc::new(InMemoryStorage::new())));

        let mut calls = Vec::new();
        let records = loader
            .load_all_decrypted_with_progress("pw", |done, total| calls.push((done, total)))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(calls, vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_custom_batch_width() {
        let store = store_with(&[("pw", 3)]).await;
        assert!(BatchLoader::with_batch_width(store.clone(), 0).is_err());

        let loader = BatchLoader::with_batch_width(store, 2).unwrap();
        let mut calls = Vec::new();
        loader
            .load_report("pw", |done, total| calls.push((done, total)))
            .await
            .unwrap();
        assert_eq!(calls, vec![(2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_decrypt_records_outside_the_store() {
        let loader = BatchLoader::with_batch_width(RecordStore::new(Arc::new(InMemoryStorage::new())), 2).unwrap();

        let mut records = Vec::new();
        for n in 0..3 {
            let envelope = EnvelopeCodec::encrypt(&json!({"n": n}).to_string(), "pw").unwrap();
            records.push(VaultRecord {
                id: RecordId::from(format!("item-{}", n)),
                envelope: envelope.to_json().unwrap(),
            });
        }
        records.push(VaultRecord {
            id: RecordId::from("other"),
            envelope: EnvelopeCodec::encrypt("{}", "not-pw").unwrap().to_json().unwrap(),
        });

        let mut calls = Vec::new();
        let report = loader
            .decrypt_records(records, "pw", |done, total| calls.push((done, total)))
            .await;

        assert_eq!(calls, vec![(2, 4), (4, 4)]);
        assert_eq!(report.decrypted_count(), 3);
        assert_eq!(report.skipped().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["other"]);
    }
}
