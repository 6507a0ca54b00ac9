//! An in-process ledger. Serves as a development chain (`thorchainspam
//! devnet`) and as the backend of integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use super::ChainBackend;
use super::ChainError;
use crate::clp;
use crate::clp::Clp;
use crate::clp::ClpError;
use crate::clp::ClpKeeper;
use crate::models::account::AccountState;
use crate::models::address::AccAddress;
use crate::models::coins::Coins;
use crate::models::msg::Msg;
use crate::models::msg::MsgSend;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;
use crate::models::tx::DeliverTxResponse;
use crate::models::tx::StdSignDoc;
use crate::models::tx::StdTx;
use crate::models::tx::TxRejection;

/// Gas every transaction costs regardless of its content.
pub const GAS_PER_TX: u64 = 1_000;

pub const GAS_PER_MSG: u64 = 1_000;

pub fn gas_required(msg_count: usize) -> u64 {
    GAS_PER_TX + GAS_PER_MSG * msg_count as u64
}

impl From<ClpError> for TxRejection {
    fn from(error: ClpError) -> Self {
        match error {
            ClpError::UnknownRequest { route, type_name } => TxRejection::UnknownRequest {
                route: route.to_string(),
                type_name: type_name.to_string(),
            },
            other => TxRejection::Clp(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    accounts: HashMap<AccAddress, AccountState>,
    next_account_number: u64,
    clp: ClpKeeper,
}

impl Ledger {
    fn account_or_create(&mut self, address: AccAddress) -> &mut AccountState {
        let next_account_number = &mut self.next_account_number;
        self.accounts.entry(address).or_insert_with(|| {
            let account = AccountState::new(address, *next_account_number);
            *next_account_number += 1;
            account
        })
    }

    fn apply_msg(&mut self, msg: &Msg) -> Result<(), TxRejection> {
        match msg {
            Msg::Send(send) => self.apply_send(send),
            Msg::Clp(_) => Ok(clp::handle_msg(&mut self.clp, msg)?),
        }
    }

    fn apply_send(&mut self, send: &MsgSend) -> Result<(), TxRejection> {
        if !send.amount.is_all_positive() {
            return Err(TxRejection::InvalidCoins(send.amount.to_string()));
        }
        let from = self
            .accounts
            .get_mut(&send.from_address)
            .ok_or(TxRejection::UnknownAccount(send.from_address))?;
        let remaining = from.coins.checked_sub(&send.amount).ok_or_else(|| {
            TxRejection::InsufficientFunds {
                address: send.from_address,
                available: from.coins.to_string(),
                required: send.amount.to_string(),
            }
        })?;
        from.coins = remaining.non_zero();

        let to = self.account_or_create(send.to_address);
        to.coins = to.coins.add(&send.amount);
        Ok(())
    }
}

#[derive(Debug)]
struct ChainState {
    chain_id: String,
    height: u64,
    ledger: Ledger,
}

impl ChainState {
    /// Checks `tx` against the current state and applies all of its messages,
    /// or none of them.
    fn apply(&mut self, tx: &StdTx) -> Result<DeliverTxResponse, TxRejection> {
        if tx.msgs.is_empty() {
            return Err(TxRejection::EmptyMsgs);
        }
        let [signature] = tx.signatures.as_slice() else {
            return Err(TxRejection::MissingSignature);
        };
        let signer = signature.signer();
        if let Some(msg) = tx.msgs.iter().find(|msg| msg.signer() != signer) {
            return Err(TxRejection::SignerMismatch(msg.signer()));
        }

        let account = self
            .ledger
            .accounts
            .get(&signer)
            .ok_or(TxRejection::UnknownAccount(signer))?;
        if signature.account_number != account.account_number {
            return Err(TxRejection::WrongAccountNumber {
                expected: account.account_number,
                got: signature.account_number,
            });
        }
        if signature.sequence != account.sequence {
            return Err(TxRejection::WrongSequence {
                expected: account.sequence,
                got: signature.sequence,
            });
        }

        let doc = StdSignDoc {
            chain_id: self.chain_id.clone(),
            account_number: account.account_number,
            sequence: account.sequence,
            fee: tx.fee.clone(),
            msgs: tx.msgs.clone(),
            memo: tx.memo.clone(),
        };
        let sign_bytes = doc
            .sign_bytes()
            .map_err(|e| TxRejection::Encoding(e.to_string()))?;
        if !signature.verify(&sign_bytes) {
            return Err(TxRejection::BadSignature);
        }

        let required = gas_required(tx.msgs.len());
        if tx.fee.gas < required {
            return Err(TxRejection::OutOfGas {
                limit: tx.fee.gas,
                required,
            });
        }

        let mut ledger = self.ledger.clone();
        for msg in &tx.msgs {
            ledger.apply_msg(msg)?;
        }
        ledger.account_or_create(signer).sequence += 1;
        self.ledger = ledger;
        self.height += 1;

        Ok(DeliverTxResponse {
            code: 0,
            log: String::new(),
            gas_wanted: tx.fee.gas,
            gas_used: required,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LocalChain {
    state: Arc<Mutex<ChainState>>,
}

impl LocalChain {
    /// A chain at height zero holding `genesis` balances. Genesis accounts
    /// get account numbers in iteration order.
    pub fn new(
        chain_id: impl Into<String>,
        genesis: impl IntoIterator<Item = (AccAddress, Coins)>,
    ) -> Self {
        let mut ledger = Ledger::default();
        for (address, coins) in genesis {
            let account = ledger.account_or_create(address);
            account.coins = account.coins.add(&coins);
        }

        Self {
            state: Arc::new(Mutex::new(ChainState {
                chain_id: chain_id.into(),
                height: 0,
                ledger,
            })),
        }
    }

    pub async fn chain_id(&self) -> String {
        self.state.lock().await.chain_id.clone()
    }

    pub async fn height(&self) -> u64 {
        self.state.lock().await.height
    }

    pub async fn account(&self, address: &AccAddress) -> Option<AccountState> {
        self.state.lock().await.ledger.accounts.get(address).cloned()
    }

    pub async fn account_count(&self) -> usize {
        self.state.lock().await.ledger.accounts.len()
    }

    /// Sum of every account's balance.
    pub async fn total_supply(&self) -> Coins {
        self.state
            .lock()
            .await
            .ledger
            .accounts
            .values()
            .fold(Coins::empty(), |total, account| total.add(&account.coins))
    }

    pub async fn last_clp_test(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .ledger
            .clp
            .last_test()
            .map(str::to_string)
    }

    pub async fn clp(&self, ticker: &str) -> Option<Clp> {
        self.state.lock().await.ledger.clp.clp(ticker).cloned()
    }

    /// Checks and applies `tx`.
    ///
    /// In async mode only the hash comes back; a rejection is logged but not
    /// returned, as a node would not know about it when it answers.
    pub async fn deliver(
        &self,
        tx: StdTx,
        mode: BroadcastMode,
    ) -> Result<BroadcastResult, TxRejection> {
        let hash = tx
            .hash()
            .map_err(|e| TxRejection::Encoding(e.to_string()))?;
        let mut state = self.state.lock().await;
        let outcome = state.apply(&tx);

        match mode {
            BroadcastMode::Sync => {
                let response = outcome?;
                debug!(%hash, height = state.height, "transaction committed");
                Ok(BroadcastResult {
                    hash,
                    height: Some(state.height),
                    deliver_tx: Some(response),
                })
            }
            BroadcastMode::Async => {
                if let Err(rejection) = outcome {
                    warn!(%hash, %rejection, "asynchronously broadcast transaction was rejected");
                }
                Ok(BroadcastResult {
                    hash,
                    height: None,
                    deliver_tx: None,
                })
            }
        }
    }
}

#[async_trait]
impl ChainBackend for LocalChain {
    async fn query_account(
        &self,
        address: AccAddress,
    ) -> Result<Option<AccountState>, ChainError> {
        Ok(self.account(&address).await)
    }

    async fn broadcast(&self, tx: StdTx, mode: BroadcastMode) -> Result<BroadcastResult, ChainError> {
        Ok(self.deliver(tx, mode).await?)
    }
}
