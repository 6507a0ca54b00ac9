//! The set of spam accounts: every key-store entry whose name starts with a
//! shared prefix. Nothing about the pool is stored besides the keys.

use std::sync::Arc;

use tracing::debug;

use crate::keys::KeyInfo;
use crate::keys::KeyStore;
use crate::keys::KeyStoreError;
use crate::keys::SigningAlgo;

pub const DEFAULT_SPAM_PREFIX: &str = "spam";

#[derive(Debug, Clone)]
pub struct AccountPool {
    keystore: Arc<dyn KeyStore>,
    prefix: String,
}

impl AccountPool {
    pub fn new(keystore: Arc<dyn KeyStore>, prefix: impl Into<String>) -> Self {
        Self {
            keystore,
            prefix: prefix.into(),
        }
    }

    pub fn keystore(&self) -> &Arc<dyn KeyStore> {
        &self.keystore
    }

    /// `<prefix>-<index>`
    pub fn account_name(&self, index: usize) -> String {
        format!("{}-{}", self.prefix, index)
    }

    /// Pool members in key-store enumeration order, which need not follow
    /// their indices.
    pub async fn list(&self) -> Result<Vec<KeyInfo>, KeyStoreError> {
        Ok(self
            .keystore
            .list()
            .await?
            .into_iter()
            .filter(|key| key.name.starts_with(&self.prefix))
            .collect())
    }

    pub async fn count(&self) -> Result<usize, KeyStoreError> {
        Ok(self.list().await?.len())
    }

    /// Creates the account `<prefix>-<index>`.
    pub async fn create_next(&self, index: usize, password: &str) -> Result<KeyInfo, KeyStoreError> {
        let name = self.account_name(index);
        let key = self
            .keystore
            .create(&name, password, SigningAlgo::Secp256k1)
            .await?;
        debug!(name = %name, address = %key.address, "created spam account");
        Ok(key)
    }
}
