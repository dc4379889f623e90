//! Encrypted backups
//!
//! An archive is one envelope, sealed under an export password of the user's
//! choosing, wrapping a tagged payload:
//!
//! ```text
//! {"format": 2, "records": [{...fields...}, ...]}                 plain records
//! {"format": 1, "records": [{"id": "...", "envelope": ...}, ...]} legacy, sealed per item
//! ```
//!
//! Archives written before the tag existed are a bare JSON array of either
//! shape. They are classified once, for the whole archive.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use crate::batch_loader::BatchLoader;
use crate::envelope::EnvelopeCodec;
use crate::error::{Result, VaultError};
use crate::record_store::{seal_fields, RecordFields, RecordStore};
use crate::storage::{RecordId, VaultRecord, VaultStorage};

/// Payload whose records each carry their own envelope
pub const ARCHIVE_FORMAT_LEGACY: u32 = 1;

/// Payload of plain record objects
pub const ARCHIVE_FORMAT_PLAIN: u32 = 2;

/// File suffix of exported archives
pub const BACKUP_EXTENSION: &str = "cvb";

#[derive(Serialize, Deserialize)]
struct TaggedArchive {
    format: u32,
    records: Vec<Value>,
}

#[derive(Deserialize)]
struct LegacyItem {
    id: Value,
    envelope: Value,
}

enum ArchiveContents {
    Plain(Vec<RecordFields>),
    Legacy(Vec<LegacyItem>),
}

/// Outcome of an import
#[derive(Debug, Default)]
pub struct ImportSummary {
    /// Fresh ids of the records written
    pub imported: Vec<RecordId>,
    /// Legacy items that did not open under the import password
    pub skipped: usize,
}

/// `contract-vault-backup-YYYY-MM-DD.cvb`
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("contract-vault-backup-{}.{}", date.format("%Y-%m-%d"), BACKUP_EXTENSION)
}

pub fn is_backup_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(BACKUP_EXTENSION))
        .unwrap_or(false)
}

fn import_error(context: &str) -> impl Fn(VaultError) -> VaultError + '_ {
    move |e| VaultError::Import(format!("{}: {}", context, e))
}

fn parse_payload(payload: &str) -> Result<ArchiveContents> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| VaultError::Import(format!("archive payload is not JSON: {}", e)))?;

    match value {
        Value::Object(_) => {
            let tagged: TaggedArchive = serde_json::from_value(value)
                .map_err(|e| VaultError::Import(format!("malformed archive: {}", e)))?;
            match tagged.format {
                ARCHIVE_FORMAT_PLAIN => plain_items(tagged.records),
                ARCHIVE_FORMAT_LEGACY => legacy_items(tagged.records),
                other => Err(VaultError::Import(format!("unsupported archive format {}", other))),
            }
        }
        Value::Array(items) => {
            let all_legacy = !items.is_empty()
                && items
                    .iter()
                    .all(|item| item.get("envelope").is_some() && item.get("id").is_some());
            if all_legacy {
                legacy_items(items)
            } else {
                plain_items(items)
            }
        }
        _ => Err(VaultError::Import("archive payload is not a record list".into())),
    }
}

fn plain_items(items: Vec<Value>) -> Result<ArchiveContents> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(fields),
            _ => Err(VaultError::Import(format!("archive item {} is not a record", index))),
        })
        .collect::<Result<Vec<_>>>()
        .map(ArchiveContents::Plain)
}

fn legacy_items(items: Vec<Value>) -> Result<ArchiveContents> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<LegacyItem>(item)
                .map_err(|e| VaultError::Import(format!("legacy item {} is malformed: {}", index, e)))
        })
        .collect::<Result<Vec<_>>>()
        .map(ArchiveContents::Legacy)
}

/// Backup export and import over a record store
pub struct BackupService<S: VaultStorage> {
    store: RecordStore<S>,
    loader: BatchLoader<S>,
}

impl<S: VaultStorage> BackupService<S> {
    pub fn new(store: RecordStore<S>) -> Self {
        let loader = BatchLoader::new(store.clone());
        Self { store, loader }
    }

    pub fn with_loader(store: RecordStore<S>, loader: BatchLoader<S>) -> Self {
        Self { store, loader }
    }

    /// Seal every record readable under `session_password` into one archive
    /// under `export_password`.
    ///
    /// Records that do not open under the session password are left out.
    /// Nothing readable means nothing to export, which is an error.
    pub async fn export_all_encrypted(
        &self,
        session_password: &str,
        export_password: &str,
    ) -> Result<String> {
        let records = self
            .loader
            .load_all_decrypted(session_password)
            .await
            .map_err(|e| VaultError::Export(e.to_string()))?;

        if records.is_empty() {
            return Err(VaultError::Export(
                "no records could be decrypted with the session password".into(),
            ));
        }

        let count = records.len();
        let archive = TaggedArchive {
            format: ARCHIVE_FORMAT_PLAIN,
            records: records
                .into_iter()
                .map(|record| Value::Object(record.fields))
                .collect(),
        };
        let payload = serde_json::to_string(&archive)
            .map_err(|e| VaultError::Export(format!("could not serialize records: {}", e)))?;

        let envelope = EnvelopeCodec::encrypt_async(payload, Zeroizing::new(export_password.to_string()))
            .await
            .map_err(|e| VaultError::Export(e.to_string()))?;
        let sealed = envelope.to_json().map_err(|e| VaultError::Export(e.to_string()))?;

        tracing::info!(records = count, "archive exported");
        Ok(sealed)
    }

    /// Open `archive` with `import_password` and add every record in it to
    /// the vault, re-sealed under `session_password` with fresh ids.
    ///
    /// Strictly additive: nothing is merged or deduplicated. The whole
    /// archive is decoded before the first write.
    pub async fn import_encrypted_archive(
        &self,
        archive: &str,
        import_password: &str,
        session_password: &str,
    ) -> Result<ImportSummary> {
        let payload = EnvelopeCodec::decrypt_json_async(
            archive.to_string(),
            Zeroizing::new(import_password.to_string()),
        )
        .await
        .map_err(import_error("could not open archive"))?;
        let payload = Zeroizing::new(payload);

        let (items, skipped) = match parse_payload(&payload)? {
            ArchiveContents::Plain(items) => (items, 0),
            ArchiveContents::Legacy(items) => {
                tracing::debug!(items = items.len(), "legacy archive, opening items");
                self.open_legacy_items(items, import_password).await
            }
        };

        let mut summary = ImportSummary {
            imported: Vec::with_capacity(items.len()),
            skipped,
        };

        for fields in &items {
            let envelope = seal_fields(fields, session_password)
                .await
                .map_err(import_error("could not seal record"))?;
            let id = RecordId::generate();
            self.store
                .save(&id, &envelope)
                .await
                .map_err(import_error("could not store record"))?;
            summary.imported.push(id);
        }

        tracing::info!(
            imported = summary.imported.len(),
            skipped = summary.skipped,
            "archive imported"
        );
        Ok(summary)
    }

    async fn open_legacy_items(&self, items: Vec<LegacyItem>, password: &str) -> (Vec<RecordFields>, usize) {
        let records: Vec<VaultRecord> = items
            .into_iter()
            .map(|item| VaultRecord {
                id: RecordId::from(match item.id {
                    Value::String(id) => id,
                    other => other.to_string(),
                }),
                envelope: match item.envelope {
                    Value::String(serialized) => serialized,
                    other => other.to_string(),
                },
            })
            .collect();

        let report = self.loader.decrypt_records(records, password, |_, _| {}).await;
        for (id, reason) in report.skipped() {
            tracing::warn!(%id, %reason, "legacy archive item skipped");
        }

        let skipped = report.skipped_count();
        let opened = report.into_records().into_iter().map(|record| record.fields).collect();
        (opened, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> (RecordStore<InMemoryStorage>, BackupService<InMemoryStorage>) {
        let store = RecordStore::new(Arc::new(InMemoryStorage::new()));
        (store.clone(), BackupService::new(store))
    }

    fn seal(payload: &Value, password: &str) -> String {
        EnvelopeCodec::encrypt(&payload.to_string(), password)
            .unwrap()
            .to_json()
            .unwrap()
    }

    #[test]
    fn test_backup_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(backup_file_name(date), "contract-vault-backup-2026-03-09.cvb");

        assert!(is_backup_file(Path::new("/tmp/contract-vault-backup-2026-03-09.cvb")));
        assert!(is_backup_file(Path::new("BACKUP.CVB")));
        assert!(!is_backup_file(Path::new("backup.json")));
        assert!(!is_backup_file(Path::new("cvb")));
    }

    #[test]
    fn test_parse_untagged_arrays() {
        let plain = json!([{"title": "A"}, {"title": "B", "envelope": "not-a-pair"}]);
        assert!(matches!(
            parse_payload(&plain.to_string()).unwrap(),
            ArchiveContents::Plain(items) if items.len() == 2
        ));

        let legacy = json!([{"id": "1", "envelope": "{}"}, {"id": "2", "envelope": "{}"}]);
        assert!(matches!(
            parse_payload(&legacy.to_string()).unwrap(),
            ArchiveContents::Legacy(items) if items.len() == 2
        ));

        assert!(matches!(
            parse_payload("[]").unwrap(),
            ArchiveContents::Plain(items) if items.is_empty()
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for payload in ["\"text\"", "42", "[1, 2]", "{\"format\": 9, \"records\": []}", "{\"records\": []}"] {
            assert!(
                matches!(parse_payload(payload), Err(VaultError::Import(_))),
                "accepted {}",
                payload
            );
        }
    }

    #[tokio::test]
    async fn test_export_empty_vault_fails() {
        let (_, backup) = service();
        let result = backup.export_all_encrypted("session", "export").await;
        assert!(matches!(result, Err(VaultError::Export(_))));
    }

    #[tokio::test]
    async fn test_export_skips_foreign_records() {
        let (store, backup) = service();
        store
            .create(json!({"title": "mine"}).as_object().unwrap(), "session")
            .await
            .unwrap();
        store
            .create(json!({"title": "old"}).as_object().unwrap(), "previous")
            .await
            .unwrap();

        let archive = backup.export_all_encrypted("session", "export").await.unwrap();
        let envelope = crate::envelope::Envelope::from_json(&archive).unwrap();
        let payload: Value =
            serde_json::from_str(&EnvelopeCodec::decrypt(&envelope, "export").unwrap()).unwrap();

        assert_eq!(payload["format"], ARCHIVE_FORMAT_PLAIN);
        assert_eq!(payload["records"], json!([{"title": "mine"}]));
    }

    #[tokio::test]
    async fn test_import_wrong_password() {
        let (store, backup) = service();
        let archive = seal(&json!({"format": 2, "records": [{"title": "A"}]}), "right");

        let result = backup.import_encrypted_archive(&archive, "wrong", "session").await;
        assert!(matches!(result, Err(VaultError::Import(_))));

        let result = backup.import_encrypted_archive("not an archive", "right", "session").await;
        assert!(matches!(result, Err(VaultError::Import(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_import_untagged_plain_array() {
        let (store, backup) = service();
        let archive = seal(&json!([{"title": "A"}, {"title": "B"}]), "x");

        let summary = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();
        assert_eq!(summary.imported.len(), 2);
        assert_eq!(summary.skipped, 0);

        let loaded = BatchLoader::new(store).load_all_decrypted("session").await.unwrap();
        let mut titles: Vec<_> = loaded.iter().filter_map(|r| r.get_str("title")).collect();
        titles.sort();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_import_is_additive() {
        let (store, backup) = service();
        let existing = store
            .create(json!({"title": "A"}).as_object().unwrap(), "session")
            .await
            .unwrap();
        let archive = seal(&json!({"format": 2, "records": [{"title": "A"}]}), "x");

        let first = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();
        let second = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert_ne!(first.imported[0], existing);
        assert_ne!(first.imported[0], second.imported[0]);
    }

    #[tokio::test]
    async fn test_legacy_item_under_other_password_is_skipped() {
        let (store, backup) = service();
        let good = EnvelopeCodec::encrypt("{\"title\":\"ok\"}", "x").unwrap().to_json().unwrap();
        let bad = EnvelopeCodec::encrypt("{\"title\":\"no\"}", "y").unwrap().to_json().unwrap();
        let archive = seal(
            &json!({"format": 1, "records": [{"id": "1", "envelope": good}, {"id": "2", "envelope": bad}]}),
            "x",
        );

        let summary = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_legacy_items_use_loader_width() {
        let store = RecordStore::new(Arc::new(InMemoryStorage::new()));
        let loader = BatchLoader::with_batch_width(store.clone(), 2).unwrap();
        let backup = BackupService::with_loader(store.clone(), loader);

        let items: Vec<Value> = (0..3)
            .map(|n| {
                let envelope = EnvelopeCodec::encrypt(&json!({"title": n}).to_string(), "x").unwrap();
                json!({"id": n.to_string(), "envelope": envelope.to_json().unwrap()})
            })
            .collect();
        let archive = seal(&json!({"format": 1, "records": items}), "x");

        let summary = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();
        assert_eq!(summary.imported.len(), 3);
        assert_eq!(summary.skipped, 0);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_legacy_envelope_as_embedded_object() {
        let (_, backup) = service();
        let inner = EnvelopeCodec::encrypt("{\"title\":\"embedded\"}", "x").unwrap().to_json().unwrap();
        let inner: Value = serde_json::from_str(&inner).unwrap();
        let archive = seal(&json!([{"id": 17, "envelope": inner}]), "x");

        let summary = backup.import_encrypted_archive(&archive, "x", "session").await.unwrap();
        assert_eq!(summary.imported.len(), 1);
        assert_eq!(summary.skipped, 0);
    }
}
