use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KdfParams;
use super::KeyInfo;
use super::KeyRecord;
use super::KeySignature;
use super::KeyStore;
use super::KeyStoreError;
use super::SigningAlgo;

/// A key store that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    records: RwLock<BTreeMap<String, Arc<KeyRecord>>>,
    kdf: KdfParams,
}

impl MemoryKeyStore {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            kdf,
        }
    }

    async fn record(&self, name: &str) -> Result<Arc<KeyRecord>, KeyStoreError> {
        self.records
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| KeyStoreError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn list(&self) -> Result<Vec<KeyInfo>, KeyStoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(|record| record.info.clone())
            .collect())
    }

    async fn get(&self, name: &str) -> Result<KeyInfo, KeyStoreError> {
        Ok(self.record(name).await?.info.clone())
    }

    async fn create(
        &self,
        name: &str,
        password: &str,
        algo: SigningAlgo,
    ) -> Result<KeyInfo, KeyStoreError> {
        if self.records.read().await.contains_key(name) {
            return Err(KeyStoreError::DuplicateName(name.to_string()));
        }

        let (owned_name, owned_password, kdf) = (name.to_string(), password.to_string(), self.kdf);
        let record = tokio::task::spawn_blocking(move || {
            KeyRecord::generate(&owned_name, &owned_password, algo, kdf)
        })
        .await??;

        let mut records = self.records.write().await;
        if records.contains_key(name) {
            return Err(KeyStoreError::DuplicateName(name.to_string()));
        }
        let info = record.info.clone();
        records.insert(name.to_string(), Arc::new(record));
        Ok(info)
    }

    async fn sign(
        &self,
        name: &str,
        password: &str,
        sign_bytes: &[u8],
    ) -> Result<KeySignature, KeyStoreError> {
        let record = self.record(name).await?;
        let (password, sign_bytes) = (password.to_string(), sign_bytes.to_vec());
        tokio::task::spawn_blocking(move || record.sign(&password, &sign_bytes)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_list_sign() {
        let store = MemoryKeyStore::new(KdfParams::insecure());
        let bob = store.create("bob", "pw", SigningAlgo::Secp256k1).await.unwrap();
        let alice = store.create("alice", "pw", SigningAlgo::Secp256k1).await.unwrap();

        assert_eq!(bob, store.get("bob").await.unwrap());
        assert_eq!(vec![alice.clone(), bob], store.list().await.unwrap());

        let signature = store.sign("alice", "pw", b"hello").await.unwrap();
        assert_eq!(alice.address, signature.signer());
        assert!(signature.verify(b"hello"));
    }

    #[tokio::test]
    async fn duplicate_and_missing_names() {
        let store = MemoryKeyStore::new(KdfParams::insecure());
        store.create("bob", "pw", SigningAlgo::Secp256k1).await.unwrap();

        assert!(matches!(
            store.create("bob", "other", SigningAlgo::Secp256k1).await,
            Err(KeyStoreError::DuplicateName(_))
        ));
        assert!(matches!(
            store.get("carol").await,
            Err(KeyStoreError::NotFound(_))
        ));
        assert!(matches!(
            store.sign("carol", "pw", b"x").await,
            Err(KeyStoreError::NotFound(_))
        ));
    }
}
