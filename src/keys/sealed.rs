//! Password sealing of secret keys: Argon2id derives a 256-bit key from the
//! password, AES-256-GCM encrypts the secret under it.

use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use argon2::Algorithm;
use argon2::Argon2;
use argon2::Params;
use argon2::Version;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use zeroize::Zeroizing;

use super::KeyStoreError;

const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Cost for spam accounts. Every dispatch unit unseals one of these per
    /// round, up to `concurrency` at the same time.
    pub fn throwaway() -> Self {
        Self {
            m_cost: 1024,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Smallest cost argon2 accepts. For tests only.
    pub fn insecure() -> Self {
        Self {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn derive_key(
        &self,
        password: &str,
        salt: &[u8],
    ) -> Result<Zeroizing<[u8; 32]>, KeyStoreError> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(32))
            .map_err(|e| KeyStoreError::Sealing(format!("invalid Argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut *key)
            .map_err(|e| KeyStoreError::Sealing(format!("Argon2id key derivation failed: {e}")))?;
        Ok(key)
    }
}

/// A 32-byte secret encrypted under a password.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SealedSecret {
    kdf: KdfParams,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl SealedSecret {
    pub(crate) fn seal(
        secret: &[u8; 32],
        password: &str,
        kdf: KdfParams,
    ) -> Result<Self, KeyStoreError> {
        let mut rng = rand::rng();
        let salt: [u8; SALT_LENGTH] = rng.random();
        let nonce: [u8; NONCE_LENGTH] = rng.random();

        let key = kdf.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeyStoreError::Sealing(format!("invalid AES key: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
            .map_err(|e| KeyStoreError::Sealing(format!("encryption failed: {e}")))?;

        Ok(Self {
            kdf,
            salt: salt.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Fails on a wrong password or tampered data alike.
    pub(crate) fn open(&self, password: &str) -> Result<Zeroizing<[u8; 32]>, KeyStoreError> {
        if self.nonce.len() != NONCE_LENGTH {
            return Err(KeyStoreError::Sealing("malformed nonce".to_string()));
        }
        let key = self.kdf.derive_key(password, &self.salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| KeyStoreError::Sealing(format!("invalid AES key: {e}")))?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
                .map_err(|e| {
                    KeyStoreError::Sealing(format!(
                        "decryption failed (wrong password or corrupted data): {e}"
                    ))
                })?,
        );

        let mut secret = Zeroizing::new([0u8; 32]);
        if plaintext.len() != secret.len() {
            return Err(KeyStoreError::Sealing("sealed secret has wrong length".to_string()));
        }
        secret.copy_from_slice(&plaintext);
        Ok(secret)
    }
}
