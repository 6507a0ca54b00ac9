//! Talking to the chain: querying accounts and broadcasting signed
//! transactions.
//!
//! [`ChainClient`] is what the provisioner and the dispatcher consume.
//! [`KeybaseClient`] implements it by signing with the local key store and
//! handing the transaction to a [`ChainBackend`], which is either a remote
//! node ([`rpc::RpcBackend`]) or an in-process ledger ([`local::LocalChain`]).

pub mod local;
pub mod rpc;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use crate::keys::KeyStore;
use crate::keys::KeyStoreError;
use crate::models::account::AccountState;
use crate::models::address::AccAddress;
use crate::models::msg::Msg;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;
use crate::models::tx::StdFee;
use crate::models::tx::StdSignDoc;
use crate::models::tx::StdSignature;
use crate::models::tx::StdTx;
use crate::models::tx::TxRejection;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ChainError {
    #[error("account query failed: {0}")]
    Query(String),

    #[error("could not sign transaction")]
    Signing(#[source] KeyStoreError),

    #[error("could not encode transaction: {0}")]
    Encoding(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("transaction rejected: {0}")]
    Rejected(#[from] TxRejection),
}

/// Everything needed to sign one transaction with a local key and
/// broadcast it.
#[derive(Clone)]
pub struct SignRequest {
    pub from_name: String,
    pub password: Zeroizing<String>,
    pub msgs: Vec<Msg>,
    pub gas: u64,
    pub account_number: u64,
    pub sequence: u64,
    pub mode: BroadcastMode,
}

impl Debug for SignRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignRequest")
            .field("from_name", &self.from_name)
            .field("msgs", &self.msgs)
            .field("gas", &self.gas)
            .field("account_number", &self.account_number)
            .field("sequence", &self.sequence)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync + Debug {
    /// The chain's current view of `address`, or `None` if the chain has
    /// never seen it.
    async fn query_account(&self, address: &AccAddress)
        -> Result<Option<AccountState>, ChainError>;

    async fn sign_and_broadcast(&self, request: SignRequest)
        -> Result<BroadcastResult, ChainError>;
}

/// Where signed transactions go.
#[async_trait]
pub trait ChainBackend: Send + Sync + Debug {
    async fn query_account(&self, address: AccAddress)
        -> Result<Option<AccountState>, ChainError>;

    async fn broadcast(&self, tx: StdTx, mode: BroadcastMode)
        -> Result<BroadcastResult, ChainError>;
}

#[async_trait]
impl<B: ChainBackend + ?Sized> ChainBackend for Arc<B> {
    async fn query_account(&self, address: AccAddress)
        -> Result<Option<AccountState>, ChainError> {
        (**self).query_account(address).await
    }

    async fn broadcast(&self, tx: StdTx, mode: BroadcastMode)
        -> Result<BroadcastResult, ChainError> {
        (**self).broadcast(tx, mode).await
    }
}

#[derive(Debug, Clone)]
pub struct KeybaseClient<B> {
    keystore: Arc<dyn KeyStore>,
    backend: B,
    chain_id: String,
}

impl<B: ChainBackend> KeybaseClient<B> {
    pub fn new(keystore: Arc<dyn KeyStore>, backend: B, chain_id: impl Into<String>) -> Self {
        Self {
            keystore,
            backend,
            chain_id: chain_id.into(),
        }
    }
}

#[async_trait]
impl<B: ChainBackend> ChainClient for KeybaseClient<B> {
    async fn query_account(
        &self,
        address: &AccAddress,
    ) -> Result<Option<AccountState>, ChainError> {
        self.backend.query_account(*address).await
    }

    async fn sign_and_broadcast(&self, request: SignRequest) -> Result<BroadcastResult, ChainError> {
        let doc = StdSignDoc {
            chain_id: self.chain_id.clone(),
            account_number: request.account_number,
            sequence: request.sequence,
            fee: StdFee::with_gas(request.gas),
            msgs: request.msgs,
            memo: String::new(),
        };
        let sign_bytes = doc
            .sign_bytes()
            .map_err(|e| ChainError::Encoding(e.to_string()))?;
        let signature = self
            .keystore
            .sign(&request.from_name, &request.password, &sign_bytes)
            .await
            .map_err(ChainError::Signing)?;

        let tx = StdTx {
            msgs: doc.msgs,
            fee: doc.fee,
            signatures: vec![StdSignature {
                pub_key: signature.pub_key,
                signature: signature.signature,
                account_number: request.account_number,
                sequence: request.sequence,
            }],
            memo: doc.memo,
        };
        debug!(
            from = %request.from_name,
            sequence = request.sequence,
            msgs = tx.msgs.len(),
            "broadcasting transaction"
        );
        self.backend.broadcast(tx, request.mode).await
    }
}
