mod common;

use std::sync::Arc;

use common::coins;
use common::logging::tracing_logger;
use common::treasury_and_chain;
use common::CHAIN_ID;
use common::TREASURY;
use common::TREASURY_PASSWORD;
use thorchain_spam::chain::local::LocalChain;
use thorchain_spam::chain::rpc;
use thorchain_spam::chain::rpc::RpcBackend;
use thorchain_spam::chain::ChainBackend;
use thorchain_spam::chain::ChainClient;
use thorchain_spam::chain::KeybaseClient;
use thorchain_spam::dispatch::DispatchPolicy;
use thorchain_spam::dispatch::SpamDispatcher;
use thorchain_spam::keys::KeyStore;
use thorchain_spam::models::address::AccAddress;
use thorchain_spam::models::coins::Coins;
use thorchain_spam::models::tx::BroadcastMode;
use thorchain_spam::pool::AccountPool;
use thorchain_spam::provision::FundingPolicy;
use thorchain_spam::provision::ProvisionRequest;
use thorchain_spam::provision::Provisioner;
use zeroize::Zeroizing;

const SPAM_PASSWORD: &str = "spam-password";

fn provision_request(target: usize, amount: &str, mode: BroadcastMode) -> ProvisionRequest {
    ProvisionRequest {
        target,
        amount: coins(amount),
        source_name: TREASURY.to_string(),
        spam_password: Zeroizing::new(SPAM_PASSWORD.to_string()),
        sign_password: Zeroizing::new(TREASURY_PASSWORD.to_string()),
        mode,
    }
}

fn client<B: ChainBackend + 'static>(keystore: &Arc<dyn KeyStore>, backend: B) -> Arc<dyn ChainClient> {
    Arc::new(KeybaseClient::new(keystore.clone(), backend, CHAIN_ID))
}

fn dispatcher(pool: &AccountPool, chain: Arc<dyn ChainClient>, concurrency: usize) -> SpamDispatcher {
    SpamDispatcher::new(
        pool.clone(),
        chain,
        DispatchPolicy {
            concurrency,
            ..Default::default()
        },
        Zeroizing::new(SPAM_PASSWORD.to_string()),
        BroadcastMode::Sync,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn provision_then_spam_against_local_chain() -> anyhow::Result<()> {
    tracing_logger();

    let genesis = coins("1000bnb,1000000rune");
    let (keystore, treasury, chain) = treasury_and_chain(&genesis.to_string()).await;
    let chain_client = client(&keystore, chain.clone());
    let pool = AccountPool::new(keystore.clone(), "spam");
    let provisioner = Provisioner::new(
        pool.clone(),
        chain_client.clone(),
        FundingPolicy {
            batch_size: 2,
            gas_per_msg: 10_000,
        },
    );

    let report = provisioner
        .ensure(&provision_request(5, "10bnb,1000rune", BroadcastMode::Sync))
        .await?;
    assert_eq!(0, report.existing);
    assert_eq!(5, report.created);
    assert_eq!(
        vec![Some(1), Some(2), Some(3)],
        report.funding_txs.iter().map(|tx| tx.height).collect::<Vec<_>>()
    );

    let spam_accounts = pool.list().await?;
    assert_eq!(5, spam_accounts.len());
    for account in &spam_accounts {
        let state = chain.account(&account.address).await.unwrap();
        assert_eq!(coins("10bnb,1000rune"), state.coins);
    }
    let treasury_state = chain.account(&treasury.address).await.unwrap();
    assert_eq!(coins("950bnb,995000rune"), treasury_state.coins);
    assert_eq!(3, treasury_state.sequence);

    let launched = dispatcher(&pool, chain_client.clone(), 3).run_round().await?;
    assert_eq!(5, launched);

    // transfers only move coins around
    assert_eq!(genesis, chain.total_supply().await);
    // one transaction per spam account at most, each from a distinct sender
    let height = chain.height().await;
    assert!((3..=8).contains(&height), "height {height}");
    let spam_sequences: u64 = {
        let mut total = 0;
        for account in &spam_accounts {
            total += chain.account(&account.address).await.unwrap().sequence;
        }
        total
    };
    assert_eq!(height - 3, spam_sequences);

    // the pool is big enough already
    let report = provisioner
        .ensure(&provision_request(5, "10bnb,1000rune", BroadcastMode::Sync))
        .await?;
    assert_eq!(5, report.existing);
    assert_eq!(0, report.created);
    assert_eq!(height, chain.height().await);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn async_funding_keeps_sequences_apart() -> anyhow::Result<()> {
    tracing_logger();

    let (keystore, treasury, chain) = treasury_and_chain("1000000rune").await;
    let provisioner = Provisioner::new(
        AccountPool::new(keystore.clone(), "spam"),
        client(&keystore, chain.clone()),
        FundingPolicy {
            batch_size: 3,
            gas_per_msg: 10_000,
        },
    );

    let report = provisioner
        .ensure(&provision_request(7, "100rune", BroadcastMode::Async))
        .await?;
    assert_eq!(7, report.created);
    assert_eq!(3, report.funding_txs.len());
    assert!(report.funding_txs.iter().all(|tx| tx.height.is_none()));

    assert_eq!(3, chain.height().await);
    assert_eq!(
        coins("999300rune"),
        chain.account(&treasury.address).await.unwrap().coins
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn spam_round_over_tarpc() -> anyhow::Result<()> {
    tracing_logger();

    let (keystore, _, chain) = treasury_and_chain("1000000rune").await;
    let (addr, server) = rpc::serve(chain.clone(), "127.0.0.1:0".parse()?).await?;
    let chain_client = client(&keystore, RpcBackend::connect(addr).await?);
    let pool = AccountPool::new(keystore.clone(), "spam");

    Provisioner::new(pool.clone(), chain_client.clone(), FundingPolicy::default())
        .ensure(&provision_request(4, "5000rune", BroadcastMode::Sync))
        .await?;
    assert_eq!(1, chain.height().await);
    assert_eq!(5, chain.account_count().await);

    assert_eq!(4, dispatcher(&pool, chain_client, 100).run_round().await?);
    assert_eq!(coins("1000000rune"), chain.total_supply().await);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn unfunded_spam_accounts_are_skipped() -> anyhow::Result<()> {
    tracing_logger();

    let (keystore, _, chain) = treasury_and_chain("1000rune").await;
    let pool = AccountPool::new(keystore.clone(), "spam");
    for index in 0..3 {
        pool.create_next(index, SPAM_PASSWORD).await?;
    }

    // none of the accounts has ever been seen by the chain
    assert_eq!(
        3,
        dispatcher(&pool, client(&keystore, chain.clone()), 100)
            .run_round()
            .await?
    );
    assert_eq!(0, chain.height().await);
    Ok(())
}

#[tokio::test]
async fn source_unknown_to_the_chain() {
    tracing_logger();

    let (keystore, _, _) = treasury_and_chain("1000rune").await;
    let empty_chain = LocalChain::new(CHAIN_ID, Vec::<(AccAddress, Coins)>::new());
    let result = Provisioner::new(
        AccountPool::new(keystore.clone(), "spam"),
        client(&keystore, empty_chain),
        FundingPolicy::default(),
    )
    .ensure(&provision_request(2, "1rune", BroadcastMode::Sync))
    .await;

    assert!(result
        .unwrap_err()
        .to_string()
        .contains("has there been a transaction involving it?"));
}
