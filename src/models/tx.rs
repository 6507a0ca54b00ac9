//! Transactions, their signatures and what broadcasting one yields.

use std::fmt;
use std::str::FromStr;

use secp256k1::ecdsa::Signature;
use secp256k1::Message;
use secp256k1::PublicKey;
use secp256k1::Secp256k1;
use serde::Deserialize;
use serde::Serialize;
use sha3::Digest;
use sha3::Sha3_256;

use super::address::AccAddress;
use super::coins::Coins;
use super::msg::Msg;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    pub amount: Coins,
    pub gas: u64,
}

impl StdFee {
    pub fn with_gas(gas: u64) -> Self {
        Self {
            amount: Coins::empty(),
            gas,
        }
    }
}

/// Everything a signature commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignDoc {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub fee: StdFee,
    pub msgs: Vec<Msg>,
    pub memo: String,
}

impl StdSignDoc {
    pub fn sign_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A compressed secp256k1 public key and a compact ECDSA signature over
/// SHA3-256 of the sign bytes, together with the account number and
/// sequence the signer committed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub account_number: u64,
    pub sequence: u64,
}

impl StdSignature {
    pub fn signer(&self) -> AccAddress {
        AccAddress::from_public_key(&self.pub_key)
    }

    pub fn verify(&self, sign_bytes: &[u8]) -> bool {
        verify_signature(&self.pub_key, &self.signature, sign_bytes)
    }
}

pub fn verify_signature(pub_key: &[u8], signature: &[u8], sign_bytes: &[u8]) -> bool {
    let Ok(public_key) = PublicKey::from_slice(pub_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(signature) else {
        return false;
    };
    let message = Message::from_digest(Sha3_256::digest(sign_bytes).into());

    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature, &public_key)
        .is_ok()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    pub msgs: Vec<Msg>,
    pub fee: StdFee,
    pub signatures: Vec<StdSignature>,
    pub memo: String,
}

impl StdTx {
    pub fn hash(&self) -> Result<TxHash, bincode::Error> {
        let encoded = bincode::serialize(self)?;
        Ok(TxHash(Sha3_256::digest(encoded).into()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction hash {0:?}")]
pub struct ParseTxHashError(String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl FromStr for TxHash {
    type Err = ParseTxHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTxHashError(s.to_string());
        if s.len() != 64 || !s.is_ascii() {
            return Err(invalid());
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for TxHash {
    type Error = ParseTxHashError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

/// How long a broadcast waits: for the transaction to be applied, or only
/// for it to be accepted.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum BroadcastMode {
    #[default]
    Sync,
    Async,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverTxResponse {
    pub code: u32,
    pub log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
}

/// Result of a broadcast. Height and delivery response are only known in
/// sync mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub hash: TxHash,
    pub height: Option<u64>,
    pub deliver_tx: Option<DeliverTxResponse>,
}

/// Why a chain refused a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[non_exhaustive]
pub enum TxRejection {
    #[error("transaction carries no messages")]
    EmptyMsgs,

    #[error("transaction must carry exactly one signature")]
    MissingSignature,

    #[error("signer does not match message sender {0}")]
    SignerMismatch(AccAddress),

    #[error("account {0} does not exist")]
    UnknownAccount(AccAddress),

    #[error("invalid account number: expected {expected}, got {got}")]
    WrongAccountNumber { expected: u64, got: u64 },

    #[error("invalid sequence: expected {expected}, got {got}")]
    WrongSequence { expected: u64, got: u64 },

    #[error("signature verification failed (wrong chain id, account number or sequence?)")]
    BadSignature,

    #[error("out of gas: limit {limit}, required {required}")]
    OutOfGas { limit: u64, required: u64 },

    #[error("insufficient funds: {address} holds {available}, needs {required}")]
    InsufficientFunds {
        address: AccAddress,
        available: String,
        required: String,
    },

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("unrecognized {route} message type: {type_name}")]
    UnknownRequest { route: String, type_name: String },

    #[error("clp: {0}")]
    Clp(String),

    #[error("could not encode transaction: {0}")]
    Encoding(String),
}
