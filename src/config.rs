//! Runtime configuration from the environment (and `.env`)

use crate::batch_loader::DEFAULT_BATCH_WIDTH;
use crate::error::{Result, VaultError};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://contract-vault.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// `VAULT_DATABASE_URL`
    pub database_url: String,
    /// `VAULT_BATCH_WIDTH`, records decrypted concurrently
    pub batch_width: usize,
    /// `VAULT_NOTIFY_EMAIL`, reminder recipient
    pub notify_email: Option<String>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            batch_width: DEFAULT_BATCH_WIDTH,
            notify_email: None,
        }
    }
}

impl VaultConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank values fall
    /// back to defaults; malformed ones are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("VAULT_DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(width) = get("VAULT_BATCH_WIDTH") {
            config.batch_width = width
                .parse()
                .map_err(|e| VaultError::Config(format!("Invalid VAULT_BATCH_WIDTH {:?}: {}", width, e)))?;
            if config.batch_width == 0 {
                return Err(VaultError::Config("VAULT_BATCH_WIDTH must be at least 1".into()));
            }
        }

        if let Some(email) = get("VAULT_NOTIFY_EMAIL") {
            if !email.contains('@') {
                return Err(VaultError::Config(format!("Invalid VAULT_NOTIFY_EMAIL {:?}", email)));
            }
            config.notify_email = Some(email);
        }

        Ok(config)
    }
}
