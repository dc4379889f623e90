//! Password envelopes: the only unit the vault ever persists or exports
//!
//! An envelope is a JSON object `{"version":1,"salt":..,"iv":..,"ct":..}` with
//! standard base64 fields. `ct` holds the AES-GCM ciphertext with its tag.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    generate_random_bytes, AesGcmCipher, KeyDerivation, NONCE_SIZE, SALT_SIZE, TAG_SIZE,
};
use crate::error::{Result, VaultError};

/// Envelope format understood by this codec
pub const ENVELOPE_VERSION: u32 = 1;

/// A sealed string: salt and nonce travel with the ciphertext
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    pub version: u32,
    pub salt: Vec<u8>,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// On-the-wire shape, kept separate so the version can be checked before
/// anything else is decoded.
#[derive(Serialize, Deserialize)]
struct EnvelopeWire {
    version: u32,
    salt: String,
    iv: String,
    ct: String,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String> {
        let wire = EnvelopeWire {
            version: self.version,
            salt: STANDARD.encode(&self.salt),
            iv: STANDARD.encode(&self.iv),
            ct: STANDARD.encode(&self.ciphertext),
        };
        serde_json::to_string(&wire).map_err(VaultError::from)
    }

    /// Parse a serialized envelope. Unknown versions fail with
    /// [`VaultError::UnsupportedVersion`] rather than being guessed at.
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: EnvelopeWire = serde_json::from_str(json)?;
        Self::from_wire(wire)
    }

    /// Parse an envelope already embedded as a JSON object (legacy archives).
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let wire: EnvelopeWire = serde_json::from_value(value)?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: EnvelopeWire) -> Result<Self> {
        if wire.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(wire.version));
        }

        let decode = |field: &str, value: &str| {
            STANDARD
                .decode(value)
                .map_err(|e| VaultError::Serialization(format!("Invalid base64 in {}: {}", field, e)))
        };

        let envelope = Self {
            version: wire.version,
            salt: decode("salt", &wire.salt)?,
            iv: decode("iv", &wire.iv)?,
            ciphertext: decode("ct", &wire.ct)?,
        };
        envelope.check_layout()?;
        Ok(envelope)
    }

    fn check_layout(&self) -> Result<()> {
        if self.salt.len() != SALT_SIZE {
            return Err(VaultError::Serialization(format!(
                "Invalid salt length: expected {}, got {}",
                SALT_SIZE,
                self.salt.len()
            )));
        }
        if self.iv.len() != NONCE_SIZE {
            return Err(VaultError::Serialization(format!(
                "Invalid iv length: expected {}, got {}",
                NONCE_SIZE,
                self.iv.len()
            )));
        }
        if self.ciphertext.len() < TAG_SIZE {
            return Err(VaultError::Serialization("Ciphertext shorter than tag".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("version", &self.version)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Password-based authenticated encryption of strings
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Seal `plaintext` under a key derived from `password` and a fresh salt,
    /// with a fresh nonce. Never deterministic.
    pub fn encrypt(plaintext: &str, password: &str) -> Result<Envelope> {
        let salt = generate_random_bytes(SALT_SIZE);
        let iv = generate_random_bytes(NONCE_SIZE);
        let key = KeyDerivation::derive_from_password(password, &salt);

        let ciphertext = AesGcmCipher::encrypt(&key, &iv, plaintext.as_bytes())?;

        Ok(Envelope {
            version: ENVELOPE_VERSION,
            salt,
            iv,
            ciphertext,
        })
    }

    /// Open an envelope. Wrong password and tampering both surface as
    /// [`VaultError::Decryption`]; no partial plaintext is ever returned.
    pub fn decrypt(envelope: &Envelope, password: &str) -> Result<String> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(envelope.version));
        }
        envelope.check_layout()?;

        let key = KeyDerivation::derive_from_password(password, &envelope.salt);
        let plaintext = AesGcmCipher::decrypt(&key, &envelope.iv, &envelope.ciphertext)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
    }

    /// [`EnvelopeCodec::encrypt`] on the blocking pool
    pub async fn encrypt_async(plaintext: String, password: Zeroizing<String>) -> Result<Envelope> {
        let plaintext = Zeroizing::new(plaintext);
        tokio::task::spawn_blocking(move || Self::encrypt(&plaintext, &password)).await?
    }

    /// [`EnvelopeCodec::decrypt`] on the blocking pool
    pub async fn decrypt_async(envelope: Envelope, password: Zeroizing<String>) -> Result<String> {
        tokio::task::spawn_blocking(move || Self::decrypt(&envelope, &password)).await?
    }

    /// Parse a serialized envelope and open it on the blocking pool
    pub async fn decrypt_json_async(serialized: String, password: Zeroizing<String>) -> Result<String> {
        tokio::task::spawn_blocking(move || {
            let envelope = Envelope::from_json(&serialized)?;
            Self::decrypt(&envelope, &password)
        })
        .await?
    }
}
