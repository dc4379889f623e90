pub mod crypto;
pub mod envelope;
pub mod error;
pub mod storage;
pub mod sqlite_storage;
pub mod password_gate;
pub mod record_store;
pub mod batch_loader;
pub mod backup;
pub mod notifications;
pub mod config;
pub mod vault;

pub use crypto::{AesGcmCipher, KeyDerivation, SecureKey, AES_256_KEY_SIZE, NONCE_SIZE, PBKDF2_ITERATIONS, SALT_SIZE};
pub use envelope::{Envelope, EnvelopeCodec, ENVELOPE_VERSION};
pub use error::{Result, VaultError};
pub use storage::{InMemoryStorage, RecordId, VaultRecord, VaultStorage};
pub use sqlite_storage::SqliteStorage;
pub use password_gate::PasswordGate;
pub use record_store::{PlaintextRecord, RecordFields, RecordStore};
pub use batch_loader::{BatchLoader, DecryptOutcome, LoadReport, DEFAULT_BATCH_WIDTH};
pub use backup::{backup_file_name, is_backup_file, BackupService, ImportSummary};
pub use notifications::{
    ExpiryNotifier, ExpiryThreshold, LogRelay, NotificationPreferences, NotificationRelay, ReminderMessage,
};
pub use config::VaultConfig;
pub use vault::Vault;

pub mod prelude {
    pub use crate::{
        BackupService, BatchLoader, Envelope, EnvelopeCodec, InMemoryStorage, PasswordGate,
        PlaintextRecord, RecordId, RecordStore, Result, SqliteStorage, Vault, VaultConfig,
        VaultError, VaultStorage,
    };
}
