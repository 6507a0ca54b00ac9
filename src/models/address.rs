use std::fmt;
use std::str::FromStr;

use bech32::FromBase32;
use bech32::ToBase32;
use bech32::Variant;
use serde::Deserialize;
use serde::Serialize;
use sha3::Digest;
use sha3::Sha3_256;

/// Human readable part of every account address.
pub const ADDRESS_HRP: &str = "thor";

pub const ADDRESS_LENGTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AddressError {
    #[error("could not decode bech32 address: {0}")]
    Bech32(#[from] bech32::Error),

    #[error("address has prefix {found}, expected {ADDRESS_HRP}")]
    WrongPrefix { found: String },

    #[error("address must be {ADDRESS_LENGTH} bytes, got {0}")]
    WrongLength(usize),
}

/// An account address: the last 20 bytes of the SHA3-256 digest of a
/// compressed secp256k1 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccAddress([u8; ADDRESS_LENGTH]);

impl AccAddress {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha3_256::digest(public_key);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[digest.len() - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl From<[u8; ADDRESS_LENGTH]> for AccAddress {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<AccAddress> for String {
    fn from(address: AccAddress) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for AccAddress {
    type Error = AddressError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl fmt::Display for AccAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bech32::encode(ADDRESS_HRP, self.0.to_base32(), Variant::Bech32)
            .map_err(|_| fmt::Error)?;
        write!(f, "{encoded}")
    }
}

impl FromStr for AccAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, data, _variant) = bech32::decode(s.trim())?;
        if hrp != ADDRESS_HRP {
            return Err(AddressError::WrongPrefix { found: hrp });
        }
        let bytes = Vec::<u8>::from_base32(&data)?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::WrongLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}
