use std::sync::Arc;

use zeroize::Zeroizing;

use crate::envelope::{Envelope, EnvelopeCodec};
use crate::error::Result;
use crate::storage::VaultStorage;

/// Slot holding the validation token
pub const VALIDATION_SLOT: &str = "vault-validation-token";

/// Constant sealed into the validation token
const VALIDATION_PAYLOAD: &str = "valid-password";

/// Password gate: proves a candidate password without storing it
///
/// The only thing persisted is an envelope of a fixed sentinel. A password is
/// correct iff it opens that envelope.
pub struct PasswordGate<S: VaultStorage> {
    storage: Arc<S>,
}

impl<S: VaultStorage> PasswordGate<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Seal the sentinel under `password`, replacing any previous token.
    ///
    /// Existing records are not re-encrypted; those sealed under an older
    /// password stay unreadable under the new one.
    pub async fn set_password_validation(&self, password: &str) -> Result<()> {
        let envelope = EnvelopeCodec::encrypt_async(
            VALIDATION_PAYLOAD.to_string(),
            Zeroizing::new(password.to_string()),
        )
        .await?;

        self.storage.put_slot(VALIDATION_SLOT, &envelope.to_json()?).await?;
        tracing::info!("validation token written");
        Ok(())
    }

    /// True iff a token exists and `password` opens it. Never errors.
    pub async fn validate_password(&self, password: &str) -> bool {
        let token = match self.storage.get_slot(VALIDATION_SLOT).await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "could not read validation token");
                return false;
            }
        };

        let opened = EnvelopeCodec::decrypt_json_async(token, Zeroizing::new(password.to_string())).await;
        matches!(opened.as_deref(), Ok(VALIDATION_PAYLOAD))
    }

    /// Whether a master password has been set. No cryptography.
    pub async fn has_password_set(&self) -> Result<bool> {
        Ok(self.storage.get_slot(VALIDATION_SLOT).await?.is_some())
    }

    /// Forget the master password token. Records are left untouched.
    pub async fn clear(&self) -> Result<()> {
        self.storage.delete_slot(VALIDATION_SLOT).await
    }

    /// Parsed token, if one is set
    pub async fn token(&self) -> Result<Option<Envelope>> {
        match self.storage.get_slot(VALIDATION_SLOT).await? {
            Some(token) => Ok(Some(Envelope::from_json(&token)?)),
            None => Ok(None),
        }
    }
}
