//! Local key store.
//!
//! Keys are named secp256k1 key pairs. The secret is sealed under the
//! owner's password and only opened for the duration of one signature.

pub mod file_store;
pub mod memory_store;
pub mod sealed;

use std::fmt::Debug;

use async_trait::async_trait;
use bip39::Language;
use bip39::Mnemonic;
use bip39::MnemonicType;
use bip39::Seed;
use secp256k1::Message;
use secp256k1::PublicKey;
use secp256k1::Secp256k1;
use secp256k1::SecretKey;
use serde::Deserialize;
use serde::Serialize;
use sha3::Digest;
use sha3::Sha3_256;
use zeroize::Zeroizing;

pub use self::file_store::FileKeyStore;
pub use self::memory_store::MemoryKeyStore;
pub use self::sealed::KdfParams;
use self::sealed::SealedSecret;
use crate::models::address::AccAddress;
use crate::models::tx::verify_signature;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum SigningAlgo {
    #[default]
    Secp256k1,
}

/// Public part of a stored key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    pub algo: SigningAlgo,
    pub address: AccAddress,
    pub pub_key: Vec<u8>,
}

/// A signature as produced by the key store, before it is bound to an
/// account number and sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySignature {
    pub pub_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl KeySignature {
    pub fn signer(&self) -> AccAddress {
        AccAddress::from_public_key(&self.pub_key)
    }

    pub fn verify(&self, sign_bytes: &[u8]) -> bool {
        verify_signature(&self.pub_key, &self.signature, sign_bytes)
    }
}

impl KeyInfo {
    pub fn pub_key_hex(&self) -> String {
        self.pub_key.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KeyStoreError {
    #[error("invalid key name {0:?}")]
    InvalidName(String),

    #[error("a key named {0} already exists")]
    DuplicateName(String),

    #[error("no key named {0}")]
    NotFound(String),

    #[error("wrong password for key {0}")]
    WrongPassword(String),

    #[error("could not generate key: {0}")]
    KeyGeneration(String),

    #[error("key sealing failed: {0}")]
    Sealing(String),

    #[error("key store I/O failed")]
    Io(#[from] std::io::Error),

    #[error("malformed key file")]
    Serialization(#[from] serde_json::Error),

    #[error("key store task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Durable storage of named signing keys.
#[async_trait]
pub trait KeyStore: Send + Sync + Debug {
    /// All keys, in the store's enumeration order.
    async fn list(&self) -> Result<Vec<KeyInfo>, KeyStoreError>;

    async fn get(&self, name: &str) -> Result<KeyInfo, KeyStoreError>;

    /// Generates and stores a new key. Fails if `name` is taken.
    async fn create(
        &self,
        name: &str,
        password: &str,
        algo: SigningAlgo,
    ) -> Result<KeyInfo, KeyStoreError>;

    /// Signs `sign_bytes` with the key called `name`.
    async fn sign(
        &self,
        name: &str,
        password: &str,
        sign_bytes: &[u8],
    ) -> Result<KeySignature, KeyStoreError>;
}

/// What a store keeps per key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct KeyRecord {
    pub(crate) info: KeyInfo,
    sealed: SealedSecret,
}

impl KeyRecord {
    /// Draws a fresh 24-word mnemonic and derives the key pair from its seed.
    /// Runs the password KDF, so call it off the async executor.
    pub(crate) fn generate(
        name: &str,
        password: &str,
        algo: SigningAlgo,
        kdf: KdfParams,
    ) -> Result<Self, KeyStoreError> {
        validate_name(name)?;
        let secret = secret_from_mnemonic(&Mnemonic::new(MnemonicType::Words24, Language::English))?;
        let public_key = public_key_of(&secret)?.serialize().to_vec();
        let sealed = SealedSecret::seal(&secret, password, kdf)?;

        Ok(Self {
            info: KeyInfo {
                name: name.to_string(),
                algo,
                address: AccAddress::from_public_key(&public_key),
                pub_key: public_key,
            },
            sealed,
        })
    }

    /// Opens the sealed secret and signs SHA3-256 of `sign_bytes`.
    pub(crate) fn sign(
        &self,
        password: &str,
        sign_bytes: &[u8],
    ) -> Result<KeySignature, KeyStoreError> {
        let secret = self
            .sealed
            .open(password)
            .map_err(|_| KeyStoreError::WrongPassword(self.info.name.clone()))?;
        let secret_key = SecretKey::from_slice(secret.as_slice())
            .map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;
        let message = Message::from_digest(Sha3_256::digest(sign_bytes).into());
        let signature = Secp256k1::signing_only().sign_ecdsa(&message, &secret_key);

        Ok(KeySignature {
            pub_key: self.info.pub_key.clone(),
            signature: signature.serialize_compact().to_vec(),
        })
    }
}

fn validate_name(name: &str) -> Result<(), KeyStoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(KeyStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn secret_from_mnemonic(mnemonic: &Mnemonic) -> Result<Zeroizing<[u8; 32]>, KeyStoreError> {
    let seed = Seed::new(mnemonic, "");
    let secret = Zeroizing::new(<[u8; 32]>::from(Sha3_256::digest(seed.as_bytes())));
    SecretKey::from_slice(secret.as_slice())
        .map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;
    Ok(secret)
}

fn public_key_of(secret: &[u8; 32]) -> Result<PublicKey, KeyStoreError> {
    let secret_key =
        SecretKey::from_slice(secret).map_err(|e| KeyStoreError::KeyGeneration(e.to_string()))?;
    Ok(secret_key.public_key(&Secp256k1::signing_only()))
}
