mod common;

use std::env;
use std::path::PathBuf;

use clap::Parser;
use common::coins;
use common::logging::tracing_logger;
use rand::distr::Alphanumeric;
use rand::distr::SampleString;
use thorchain_spam::chain::local::LocalChain;
use thorchain_spam::chain::rpc;
use thorchain_spam::command;
use thorchain_spam::command::Cli;
use thorchain_spam::keys::FileKeyStore;
use thorchain_spam::keys::KdfParams;
use thorchain_spam::keys::KeyStore;
use thorchain_spam::pool::AccountPool;

fn temp_home() -> PathBuf {
    let user = env::var("USER").unwrap_or_else(|_| "default".to_string());
    env::temp_dir()
        .join(format!("thorchainspam-integration-tests-{user}"))
        .join(Alphanumeric.sample_string(&mut rand::rng(), 16))
}

async fn thorchainspam(home: &PathBuf, line: &[&str]) -> anyhow::Result<()> {
    let home = home.to_string_lossy().to_string();
    let cli = Cli::try_parse_from(
        ["thorchainspam", "--home", home.as_str()]
            .into_iter()
            .chain(line.iter().copied()),
    )?;
    command::run(cli).await
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_and_send_through_the_command_line() -> anyhow::Result<()> {
    tracing_logger();
    let home = temp_home();

    thorchainspam(&home, &["keys", "add", "treasury", "--password", "pw"]).await?;
    let treasury = FileKeyStore::open(home.join("keys"), KdfParams::default())
        .await?
        .get("treasury")
        .await?;

    let chain = LocalChain::new("thorchain", [(treasury.address, coins("1000000rune"))]);
    let (addr, server) = rpc::serve(chain.clone(), "127.0.0.1:0".parse()?).await?;
    let node = addr.to_string();

    // an empty pool is refused before anything is sent
    let err = thorchainspam(&home, &["--node", &node, "txs", "send"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no spam accounts found"));

    // passwords are checked before the key store is touched
    let err = thorchainspam(
        &home,
        &[
            "--node", &node, "--from", "treasury", "account", "ensure", "--k", "3", "--amount",
            "1000rune", "--sign-password", "pw",
        ],
    )
    .await
    .unwrap_err();
    assert_eq!("--spam-password is required", err.to_string());

    thorchainspam(
        &home,
        &[
            "--node",
            &node,
            "--from",
            "treasury",
            "account",
            "ensure",
            "--k",
            "3",
            "--amount",
            "1000rune",
            "--spam-password",
            "spam_account_password",
            "--sign-password",
            "pw",
        ],
    )
    .await?;
    assert_eq!(1, chain.height().await);
    assert_eq!(coins("997000rune"), chain.account(&treasury.address).await.unwrap().coins);

    let keystore = FileKeyStore::open(home.join("keys"), KdfParams::default()).await?;
    let pool = AccountPool::new(std::sync::Arc::new(keystore), "spam");
    assert_eq!(3, pool.count().await?);

    // spam accounts are sealed at a lower cost than the funding source
    let m_cost = |name: &str| -> anyhow::Result<u64> {
        let file: serde_json::Value =
            serde_json::from_slice(&std::fs::read(home.join("keys").join(format!("{name}.json")))?)?;
        Ok(file["sealed"]["kdf"]["m_cost"].as_u64().unwrap_or_default())
    };
    assert_eq!(u64::from(KdfParams::throwaway().m_cost), m_cost("spam-0")?);
    assert_eq!(u64::from(KdfParams::default().m_cost), m_cost("treasury")?);

    // a pool that is big enough needs neither a funding source nor a node
    thorchainspam(
        &home,
        &[
            "--node",
            "127.0.0.1:1",
            "account",
            "ensure",
            "--k",
            "3",
            "--spam-password",
            "spam_account_password",
            "--sign-password",
            "pw",
        ],
    )
    .await?;
    let err = thorchainspam(
        &home,
        &[
            "--node", &node, "account", "ensure", "--k", "4", "--amount", "1000rune",
            "--spam-password", "spam_account_password", "--sign-password", "pw",
        ],
    )
    .await
    .unwrap_err();
    assert_eq!("--from is required", err.to_string());
    assert_eq!(1, chain.height().await);
    assert_eq!(3, pool.count().await?);

    thorchainspam(&home, &["--node", &node, "txs", "send"]).await?;
    assert_eq!(coins("1000000rune"), chain.total_supply().await);
    assert!(chain.height().await <= 4);

    server.abort();
    Ok(())
}

#[tokio::test]
async fn keys_are_listed_and_shown() -> anyhow::Result<()> {
    tracing_logger();
    let home = temp_home();

    thorchainspam(&home, &["keys", "add", "alice", "--password", "pw"]).await?;
    thorchainspam(&home, &["--json", "keys", "list"]).await?;
    thorchainspam(&home, &["keys", "show", "alice"]).await?;

    assert!(thorchainspam(&home, &["keys", "show", "bob"]).await.is_err());
    assert!(thorchainspam(&home, &["keys", "add", "alice", "--password", "pw"])
        .await
        .is_err());
    assert!(home.join("keys").join("alice.json").exists());
    Ok(())
}
