//! One spam round: every pool account sends a random share of its balance
//! to a random pool account, with a bounded number of accounts at work at
//! any time.
//!
//! The round is run by `min(concurrency, pool size)` workers pulling work
//! units from a bounded channel. The scheduler blocks once the channel is
//! full and the round ends when every worker has drained it. A work unit
//! never fails the round: whatever happens to it is logged and dropped.

use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use crate::chain::ChainClient;
use crate::chain::ChainError;
use crate::chain::SignRequest;
use crate::keys::KeyInfo;
use crate::keys::KeyStoreError;
use crate::models::coins::Coins;
use crate::models::coins::ShareFraction;
use crate::models::msg::Msg;
use crate::models::msg::MsgSend;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;
use crate::pool::AccountPool;

pub const DEFAULT_SPAM_PASSWORD: &str = "spam_account_password";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchPolicy {
    /// Most work units running at once.
    pub concurrency: usize,
    /// Upper bound of the share of its balance an account sends.
    pub max_share: ShareFraction,
    pub gas_per_tx: u64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: 100,
            max_share: ShareFraction::HALF,
            gas_per_tx: 10_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("could not list spam accounts")]
    ListAccounts(#[from] KeyStoreError),

    #[error("no spam accounts found, please create them with `thorchainspam account ensure`")]
    EmptyPool,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// What became of one work unit.
#[derive(Debug)]
pub enum DispatchResult {
    Sent {
        to: String,
        coins: Coins,
        result: BroadcastResult,
    },
    /// The chain has never seen the account.
    AccountNotFound,
    /// The drawn share rounded to zero.
    NothingToSend,
    Failed(ChainError),
}

#[derive(Debug, Clone)]
pub struct SpamDispatcher {
    pool: AccountPool,
    chain: Arc<dyn ChainClient>,
    policy: DispatchPolicy,
    password: Zeroizing<String>,
    mode: BroadcastMode,
}

impl SpamDispatcher {
    pub fn new(
        pool: AccountPool,
        chain: Arc<dyn ChainClient>,
        policy: DispatchPolicy,
        password: Zeroizing<String>,
        mode: BroadcastMode,
    ) -> Self {
        Self {
            pool,
            chain,
            policy,
            password,
            mode,
        }
    }

    /// Runs one round over a snapshot of the pool taken now and returns
    /// once every work unit has finished. Returns the number of units run.
    pub async fn run_round(&self) -> Result<usize, DispatchError> {
        if self.policy.concurrency == 0 {
            return Err(DispatchError::ZeroConcurrency);
        }
        let accounts = Arc::new(self.pool.list().await?);
        if accounts.is_empty() {
            return Err(DispatchError::EmptyPool);
        }
        info!("Found {} spam accounts", accounts.len());

        let workers = self.policy.concurrency.min(accounts.len());
        let (unit_tx, unit_rx) = mpsc::channel::<usize>(workers);
        let unit_rx = Arc::new(Mutex::new(unit_rx));

        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            let dispatcher = self.clone();
            let accounts = accounts.clone();
            let unit_rx = unit_rx.clone();
            join_set.spawn(async move {
                loop {
                    let next = unit_rx.lock().await.recv().await;
                    let Some(index) = next else {
                        break;
                    };
                    let outcome = dispatcher.work_unit(index, &accounts).await;
                    log_outcome(index, &accounts[index], outcome);
                }
            });
        }

        let mut launched = 0;
        for index in 0..accounts.len() {
            if unit_tx.send(index).await.is_err() {
                error!("All spam workers are gone, {} units not launched", accounts.len() - index);
                break;
            }
            launched += 1;
        }
        drop(unit_tx);

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!("Spam worker failed: {e}");
            }
        }

        Ok(launched)
    }

    async fn work_unit(&self, index: usize, accounts: &[KeyInfo]) -> DispatchResult {
        let from = &accounts[index];
        debug!(index, from = %from.name, "will send from account");

        let state = match self.chain.query_account(&from.address).await {
            Ok(Some(state)) => state,
            Ok(None) => return DispatchResult::AccountNotFound,
            Err(e) => return DispatchResult::Failed(e),
        };

        let coins = state.coins.random_share(self.policy.max_share);
        if coins.is_zero() {
            return DispatchResult::NothingToSend;
        }
        let coins = coins.non_zero();
        let to_index = rand::rng().random_range(0..accounts.len());
        let to = &accounts[to_index];
        debug!(index, from = %from.name, to = %to.name, coins = %coins, "will send");

        let request = SignRequest {
            from_name: from.name.clone(),
            password: self.password.clone(),
            msgs: vec![Msg::Send(MsgSend {
                from_address: from.address,
                to_address: to.address,
                amount: coins.clone(),
            })],
            gas: self.policy.gas_per_tx,
            account_number: state.account_number,
            sequence: state.sequence,
            mode: self.mode,
        };
        match self.chain.sign_and_broadcast(request).await {
            Ok(result) => DispatchResult::Sent {
                to: to.name.clone(),
                coins,
                result,
            },
            Err(e) => DispatchResult::Failed(e),
        }
    }
}

fn log_outcome(index: usize, from: &KeyInfo, outcome: DispatchResult) {
    match outcome {
        DispatchResult::Sent { to, coins, result } => match result.height {
            Some(height) => info!(
                index,
                from = %from.name,
                %to,
                %coins,
                hash = %result.hash,
                height,
                "committed"
            ),
            None => info!(index, from = %from.name, %to, %coins, hash = %result.hash, "sent"),
        },
        DispatchResult::AccountNotFound => {
            info!(index, from = %from.name, "account not found, skipping")
        }
        DispatchResult::NothingToSend => info!(index, from = %from.name, "no coins to send, skipping"),
        DispatchResult::Failed(e) => {
            warn!(index, from = %from.name, "{:#}", anyhow::Error::from(e))
        }
    }
}
