use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::warn;

use super::KdfParams;
use super::KeyInfo;
use super::KeyRecord;
use super::KeySignature;
use super::KeyStore;
use super::KeyStoreError;
use super::SigningAlgo;

pub const KEY_FILE_EXTENSION: &str = "json";

/// A key store keeping one JSON file per key in a directory.
///
/// The directory is read once by [`FileKeyStore::open`]; new keys are
/// written through immediately.
#[derive(Debug)]
pub struct FileKeyStore {
    dir: PathBuf,
    records: RwLock<BTreeMap<String, Arc<KeyRecord>>>,
    kdf: KdfParams,
}

impl FileKeyStore {
    pub async fn open(dir: impl Into<PathBuf>, kdf: KdfParams) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut records = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXTENSION) {
                continue;
            }
            let record: KeyRecord = match serde_json::from_slice(&tokio::fs::read(&path).await?) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Ignoring unreadable key file {}: {e}", path.display());
                    continue;
                }
            };
            if Some(record.info.name.as_str()) != path.file_stem().and_then(|s| s.to_str()) {
                warn!("Ignoring key file {} whose name does not match", path.display());
                continue;
            }
            records.insert(record.info.name.clone(), Arc::new(record));
        }
        debug!("Opened key store at {} with {} keys", dir.display(), records.len());

        Ok(Self {
            dir,
            records: RwLock::new(records),
            kdf,
        })
    }

    /// Releases the store. Every key is already on disk.
    pub fn close(self) {
        debug!("Closed key store at {}", self.dir.display());
    }

    fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{KEY_FILE_EXTENSION}"))
    }

    /// Key names never start with a dot, so this cannot shadow a key file.
    fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{name}.{KEY_FILE_EXTENSION}.tmp"))
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
impl KeyStore for FileKeyStore {
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
        let encoded = serde_json::to_vec_pretty(&record)?;

        let mut records = self.records.write().await;
        if records.contains_key(name) {
            return Err(KeyStoreError::DuplicateName(name.to_string()));
        }
        // an unreadable file skipped by `open` still owns its name
        let path = self.key_path(name);
        if tokio::fs::try_exists(&path).await? {
            return Err(KeyStoreError::DuplicateName(name.to_string()));
        }
        write_atomically(&self.staging_path(name), &path, &encoded).await?;

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

/// Writes `contents` to `staging` and renames it to `path`, so a key file
/// is either complete or absent.
async fn write_atomically(staging: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let written = async {
        let mut file = tokio::fs::File::create(staging).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        tokio::fs::rename(staging, path).await
    }
    .await;
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(staging).await {
            debug!("Could not remove {}: {e}", staging.display());
        }
    }
    written
}
