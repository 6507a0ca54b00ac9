//! Brings the spam account pool up to a target size and funds every new
//! account from a source account.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use zeroize::Zeroizing;

use crate::chain::ChainClient;
use crate::chain::ChainError;
use crate::chain::SignRequest;
use crate::keys::KeyInfo;
use crate::keys::KeyStoreError;
use crate::models::account::AccountState;
use crate::models::address::AccAddress;
use crate::models::coins::Coins;
use crate::models::msg::Msg;
use crate::models::msg::MsgSend;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;
use crate::pool::AccountPool;

/// How funding transfers are packed into transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingPolicy {
    /// Most transfers per transaction.
    pub batch_size: usize,
    pub gas_per_msg: u64,
}

impl FundingPolicy {
    /// Gas limit of every funding transaction, a final short batch included.
    pub fn gas_per_tx(&self) -> u64 {
        self.gas_per_msg * self.batch_size.max(1) as u64
    }
}

impl Default for FundingPolicy {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            gas_per_msg: 10_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    /// Pool size to reach.
    pub target: usize,
    /// What every new account receives.
    pub amount: Coins,
    /// Key-store name of the funding source.
    pub source_name: String,
    pub spam_password: Zeroizing<String>,
    pub sign_password: Zeroizing<String>,
    pub mode: BroadcastMode,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub existing: usize,
    pub created: usize,
    pub funding_txs: Vec<BroadcastResult>,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProvisionError {
    #[error("could not list spam accounts")]
    ListAccounts(#[source] KeyStoreError),

    #[error("funding source key {name} is not available")]
    SourceKey {
        name: String,
        #[source]
        source: KeyStoreError,
    },

    #[error("could not query funding source account")]
    SourceQuery(#[source] ChainError),

    #[error("no account with address {0} was found in the state; has there been a transaction involving it?")]
    SourceAccountNotFound(AccAddress),

    #[error("account {address} doesn't have enough coins to fund all accounts: has {available}, needs {required}")]
    InsufficientFunds {
        address: AccAddress,
        required: Coins,
        available: Coins,
    },

    #[error("could not create spam account {name}")]
    KeyCreation {
        name: String,
        #[source]
        source: KeyStoreError,
    },

    /// Funding transaction `batch` (counting from zero) failed. Accounts in
    /// `unfunded` exist in the key store but never received coins.
    #[error("funding transaction {batch} failed; created but unfunded: {}", unfunded.join(", "))]
    FundingBatch {
        batch: usize,
        unfunded: Vec<String>,
        #[source]
        source: ChainError,
    },
}

#[derive(Debug, Clone)]
pub struct Provisioner {
    pool: AccountPool,
    chain: Arc<dyn ChainClient>,
    policy: FundingPolicy,
}

impl Provisioner {
    pub fn new(pool: AccountPool, chain: Arc<dyn ChainClient>, policy: FundingPolicy) -> Self {
        Self {
            pool,
            chain,
            policy,
        }
    }

    /// Ensures the pool holds at least `request.target` accounts.
    ///
    /// New accounts are named after the current pool size, created one by
    /// one and funded in batches of at most `batch_size` transfers. A failed
    /// batch ends the run; accounts already created stay in the key store.
    pub async fn ensure(&self, request: &ProvisionRequest) -> Result<ProvisionReport, ProvisionError> {
        let existing = self
            .pool
            .count()
            .await
            .map_err(ProvisionError::ListAccounts)?;
        if request.target <= existing {
            info!("Found {existing} spam accounts, will not create additional ones");
            return Ok(ProvisionReport {
                existing,
                ..Default::default()
            });
        }
        let to_create = request.target - existing;

        let source = self
            .pool
            .keystore()
            .get(&request.source_name)
            .await
            .map_err(|source| ProvisionError::SourceKey {
                name: request.source_name.clone(),
                source,
            })?;
        let source_state = self.source_state(&source).await?;

        let required = request.amount.scale(to_create as u64);
        if !source_state.coins.is_gte(&required) {
            return Err(ProvisionError::InsufficientFunds {
                address: source.address,
                required,
                available: source_state.coins,
            });
        }

        info!("Found {existing} spam accounts, will create {to_create} additional ones");

        let batch_size = self.policy.batch_size.max(1);
        let mut report = ProvisionReport {
            existing,
            ..Default::default()
        };
        let mut msgs = Vec::with_capacity(batch_size.min(to_create));
        let mut names = Vec::with_capacity(batch_size.min(to_create));
        let mut last_sequence = None;

        for i in 0..to_create {
            let index = existing + i;
            let account = self
                .pool
                .create_next(index, &request.spam_password)
                .await
                .map_err(|source| ProvisionError::KeyCreation {
                    name: self.pool.account_name(index),
                    source,
                })?;
            report.created += 1;

            msgs.push(Msg::Send(MsgSend {
                from_address: source.address,
                to_address: account.address,
                amount: request.amount.clone(),
            }));
            names.push(account.name);

            if msgs.len() == batch_size || i == to_create - 1 {
                let batch = report.funding_txs.len();
                let result = self
                    .fund(request, &source, std::mem::take(&mut msgs), &mut last_sequence)
                    .await
                    .map_err(|source| ProvisionError::FundingBatch {
                        batch,
                        unfunded: std::mem::take(&mut names),
                        source,
                    })?;
                debug!(batch, hash = %result.hash, accounts = names.len(), "funded batch");
                names.clear();
                report.funding_txs.push(result);
            }
        }

        Ok(report)
    }

    async fn source_state(&self, source: &KeyInfo) -> Result<AccountState, ProvisionError> {
        self.chain
            .query_account(&source.address)
            .await
            .map_err(ProvisionError::SourceQuery)?
            .ok_or(ProvisionError::SourceAccountNotFound(source.address))
    }

    /// Signs one funding transaction with a freshly queried account number
    /// and sequence. The sequence never goes below one past the previous
    /// batch's, since an asynchronously broadcast batch may not be reflected
    /// by the chain yet.
    async fn fund(
        &self,
        request: &ProvisionRequest,
        source: &KeyInfo,
        msgs: Vec<Msg>,
        last_sequence: &mut Option<u64>,
    ) -> Result<BroadcastResult, ChainError> {
        let state = self
            .chain
            .query_account(&source.address)
            .await?
            .ok_or_else(|| ChainError::Query(format!("funding source {} vanished", source.address)))?;
        let sequence = match *last_sequence {
            Some(previous) => state.sequence.max(previous + 1),
            None => state.sequence,
        };

        let result = self
            .chain
            .sign_and_broadcast(SignRequest {
                from_name: source.name.clone(),
                password: request.sign_password.clone(),
                gas: self.policy.gas_per_tx(),
                msgs,
                account_number: state.account_number,
                sequence,
                mode: request.mode,
            })
            .await?;
        *last_sequence = Some(sequence);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use assert2::let_assert;
    use tracing_test::traced_test;

    use super::*;
    use crate::keys::KdfParams;
    use crate::keys::KeyStore;
    use crate::keys::MemoryKeyStore;
    use crate::keys::SigningAlgo;
    use crate::tests::shared::ScriptedChain;

    fn coins(s: &str) -> Coins {
        s.parse().unwrap()
    }

    struct Setup {
        pool: AccountPool,
        chain: Arc<ScriptedChain>,
        source: KeyInfo,
    }

    async fn setup(source_balance: Option<&str>) -> Setup {
        let keystore: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new(KdfParams::insecure()));
        let source = keystore
            .create("source", "sign", SigningAlgo::Secp256k1)
            .await
            .unwrap();
        let chain = Arc::new(ScriptedChain::default());
        if let Some(balance) = source_balance {
            chain.set_account(source.address, coins(balance));
        }
        Setup {
            pool: AccountPool::new(keystore, "spam"),
            chain,
            source,
        }
    }

    fn request(target: usize, amount: &str) -> ProvisionRequest {
        ProvisionRequest {
            target,
            amount: coins(amount),
            source_name: "source".to_string(),
            spam_password: Zeroizing::new("spam".to_string()),
            sign_password: Zeroizing::new("sign".to_string()),
            mode: BroadcastMode::Sync,
        }
    }

    fn provisioner(setup: &Setup, batch_size: usize) -> Provisioner {
        Provisioner::new(
            setup.pool.clone(),
            setup.chain.clone(),
            FundingPolicy {
                batch_size,
                gas_per_msg: 10_000,
            },
        )
    }

    #[traced_test]
    #[tokio::test]
    async fn full_pool_is_left_alone() {
        let setup = setup(Some("1000rune")).await;
        for index in 0..3 {
            setup.pool.create_next(index, "spam").await.unwrap();
        }

        for target in [0, 2, 3] {
            let report = provisioner(&setup, 1000)
                .ensure(&request(target, "1rune"))
                .await
                .unwrap();
            assert_eq!(3, report.existing);
            assert_eq!(0, report.created);
            assert!(report.funding_txs.is_empty());
        }
        assert_eq!(0, setup.chain.broadcast_count());
        assert_eq!(0, setup.chain.query_count());
        assert!(logs_contain("will not create additional ones"));
    }

    #[tokio::test]
    async fn batches_of_at_most_batch_size_transfers() {
        let setup = setup(Some("10000rune")).await;
        let report = provisioner(&setup, 4)
            .ensure(&request(10, "3rune"))
            .await
            .unwrap();

        assert_eq!(10, report.created);
        assert_eq!(3, report.funding_txs.len());
        let broadcasts = setup.chain.broadcasts();
        assert_eq!(
            vec![4, 4, 2],
            broadcasts.iter().map(|b| b.msgs.len()).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![40_000, 40_000, 40_000],
            broadcasts.iter().map(|b| b.gas).collect::<Vec<_>>()
        );
        assert!(broadcasts.iter().all(|b| b.from_name == "source"));
        assert_eq!(
            vec![0, 1, 2],
            broadcasts.iter().map(|b| b.sequence).collect::<Vec<_>>()
        );
        assert_eq!(10, setup.pool.count().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_policy_funds_2500_accounts_in_three_transactions() {
        let setup = setup(Some("2500rune")).await;
        let report = Provisioner::new(
            setup.pool.clone(),
            setup.chain.clone(),
            FundingPolicy::default(),
        )
        .ensure(&request(2500, "1rune"))
        .await
        .unwrap();

        assert_eq!(2500, report.created);
        let broadcasts = setup.chain.broadcasts();
        assert_eq!(
            vec![1000, 1000, 500],
            broadcasts.iter().map(|b| b.msgs.len()).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![10_000_000; 3],
            broadcasts.iter().map(|b| b.gas).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn new_accounts_continue_the_index_sequence() {
        let setup = setup(Some("10000rune")).await;
        setup.pool.create_next(0, "spam").await.unwrap();
        setup.pool.create_next(1, "spam").await.unwrap();

        provisioner(&setup, 1000)
            .ensure(&request(4, "3rune"))
            .await
            .unwrap();

        let mut names = setup
            .pool
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|key| key.name)
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(vec!["spam-0", "spam-1", "spam-2", "spam-3"], names);

        let funded = setup.chain.broadcasts()[0]
            .msgs
            .iter()
            .map(|msg| match msg {
                Msg::Send(send) => send.amount.clone(),
                Msg::Clp(_) => panic!("unexpected message"),
            })
            .collect::<Vec<_>>();
        assert_eq!(vec![coins("3rune"); 2], funded);
    }

    #[tokio::test]
    async fn insufficient_funds_is_checked_per_denomination() {
        // exactly enough
        let setup = setup(Some("20bnb,30rune")).await;
        provisioner(&setup, 1000)
            .ensure(&request(10, "2bnb,3rune"))
            .await
            .unwrap();

        // one short in one denomination
        let setup = self::setup(Some("19bnb,3000rune")).await;
        let result = provisioner(&setup, 1000)
            .ensure(&request(10, "2bnb,3rune"))
            .await;
        assert!(matches!(
            result,
            Err(ProvisionError::InsufficientFunds { ref required, .. }) if *required == coins("20bnb,30rune")
        ));
        assert_eq!(0, setup.pool.count().await.unwrap());
        assert_eq!(0, setup.chain.broadcast_count());
    }

    #[tokio::test]
    async fn missing_source_account_is_reported() {
        let setup = setup(None).await;
        let result = provisioner(&setup, 1000).ensure(&request(1, "1rune")).await;
        assert!(matches!(
            result,
            Err(ProvisionError::SourceAccountNotFound(address)) if address == setup.source.address
        ));
        assert_eq!(0, setup.pool.count().await.unwrap());
    }

    #[tokio::test]
    async fn failed_batch_reports_unfunded_accounts_and_keeps_them() {
        let setup = setup(Some("10000rune")).await;
        setup.chain.fail_broadcast(1);

        let result = provisioner(&setup, 3)
            .ensure(&request(7, "1rune"))
            .await;

        let_assert!(
            Err(ProvisionError::FundingBatch {
                batch, unfunded, ..
            }) = result
        );
        assert_eq!(1, batch);
        assert_eq!(vec!["spam-3", "spam-4", "spam-5"], unfunded);
        // the run stopped after the failed batch, no rollback
        assert_eq!(6, setup.pool.count().await.unwrap());
        assert_eq!(2, setup.chain.broadcast_count());
    }
}
