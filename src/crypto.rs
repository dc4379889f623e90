//! Cryptographic primitives for password envelopes
//!
//! This module provides AES-256-GCM encryption/decryption and PBKDF2-HMAC-SHA256
//! password-based key derivation.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// AES-256 key size in bytes (256 bits)
pub const AES_256_KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Password salt size in bytes
pub const SALT_SIZE: usize = 16;

/// PBKDF2 rounds. Part of the envelope format: changing it breaks every
/// existing vault.
pub const PBKDF2_ITERATIONS: u32 = 200_000;

/// A secure key wrapper that zeroizes memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureKey {
    bytes: Vec<u8>,
}

impl SecureKey {
    /// Create a new SecureKey from raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the key bytes (use with caution)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureKey([REDACTED])")
    }
}

/// AES-256-GCM cipher wrapper
pub struct AesGcmCipher;

impl AesGcmCipher {
    /// Encrypt plaintext using AES-256-GCM under a caller-supplied nonce
    ///
    /// # Returns
    /// Ciphertext with the 16-byte authentication tag appended
    pub fn encrypt(key: &SecureKey, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        Self::check_nonce(nonce)?;

        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|e| VaultError::Crypto(format!("Encryption error: {}", e)))
    }

    /// Decrypt ciphertext (with appended tag) using AES-256-GCM
    ///
    /// Any authentication failure is reported as [`VaultError::Decryption`].
    pub fn decrypt(key: &SecureKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        Self::check_nonce(nonce)?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::Decryption)
    }

    fn cipher(key: &SecureKey) -> Result<Aes256Gcm> {
        if key.len() != AES_256_KEY_SIZE {
            return Err(VaultError::Crypto(format!(
                "Invalid key size: expected {}, got {}",
                AES_256_KEY_SIZE,
                key.len()
            )));
        }

        Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| VaultError::Crypto(format!("Cipher init error: {}", e)))
    }

    fn check_nonce(nonce: &[u8]) -> Result<()> {
        if nonce.len() != NONCE_SIZE {
            return Err(VaultError::Crypto(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce.len()
            )));
        }
        Ok(())
    }
}

/// PBKDF2-HMAC-SHA256 password key derivation
pub struct KeyDerivation;

impl KeyDerivation {
    /// Derive a 256-bit key from a password and salt
    ///
    /// Deliberately slow ([`PBKDF2_ITERATIONS`] rounds). Async callers should
    /// run this on a blocking thread.
    pub fn derive_from_password(password: &str, salt: &[u8]) -> SecureKey {
        let mut output = vec![0u8; AES_256_KEY_SIZE];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut output);
        SecureKey::new(output)
    }
}

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> SecureKey {
        SecureKey::new(generate_random_bytes(AES_256_KEY_SIZE))
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = random_key();
        let nonce = generate_random_bytes(NONCE_SIZE);
        let plaintext = b"Hello, Contract Vault!";

        let ciphertext = AesGcmCipher::encrypt(&key, &nonce, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

        let decrypted = AesGcmCipher::decrypt(&key, &nonce, &ciphertext).unwrap();
        assert_eq!(plaintext.to_vec(), decrypted);
    }

    #[test]
    fn test_wrong_key_is_decryption_error() {
        let nonce = generate_random_bytes(NONCE_SIZE);
        let ciphertext = AesGcmCipher::encrypt(&random_key(), &nonce, b"secret").unwrap();

        let result = AesGcmCipher::decrypt(&random_key(), &nonce, &ciphertext);
        assert!(matches!(result, Err(VaultError::Decryption)));
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let short_key = SecureKey::new(vec![0u8; 16]);
        let nonce = generate_random_bytes(NONCE_SIZE);
        assert!(matches!(
            AesGcmCipher::encrypt(&short_key, &nonce, b"x"),
            Err(VaultError::Crypto(_))
        ));

        assert!(matches!(
            AesGcmCipher::encrypt(&random_key(), &[0u8; 8], b"x"),
            Err(VaultError::Crypto(_))
        ));
    }

    #[test]
    fn test_key_derivation() {
        let salt = generate_random_bytes(SALT_SIZE);

        let derived1 = KeyDerivation::derive_from_password("correct horse", &salt);
        let derived2 = KeyDerivation::derive_from_password("correct horse", &salt);

        // Same inputs should produce same output
        assert_eq!(derived1.as_bytes(), derived2.as_bytes());
        assert_eq!(derived1.len(), AES_256_KEY_SIZE);

        // Different password or salt should produce different keys
        let derived3 = KeyDerivation::derive_from_password("battery staple", &salt);
        assert_ne!(derived1.as_bytes(), derived3.as_bytes());

        let other_salt = generate_random_bytes(SALT_SIZE);
        let derived4 = KeyDerivation::derive_from_password("correct horse", &other_salt);
        assert_ne!(derived1.as_bytes(), derived4.as_bytes());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = random_key();
        assert_eq!(format!("{:?}", key), "SecureKey([REDACTED])");
    }
}
