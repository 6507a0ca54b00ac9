//! Turns a parsed command line into calls on the library and prints what
//! comes back.

use std::io::stdout;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::bail;
use anyhow::ensure;
use anyhow::Context;
use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap_complete::generate;
use clap_complete::Shell;
use tokio::net::TcpListener;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use crate::chain::local::LocalChain;
use crate::chain::rpc;
use crate::chain::rpc::RpcBackend;
use crate::chain::ChainClient;
use crate::chain::KeybaseClient;
use crate::clp::rest::run_rest_server;
use crate::clp::rest::RestState;
use crate::config_models::cli_args::Args;
use crate::config_models::data_directory::DataDirectory;
use crate::dispatch::DispatchError;
use crate::dispatch::DispatchPolicy;
use crate::dispatch::SpamDispatcher;
use crate::dispatch::DEFAULT_SPAM_PASSWORD;
use crate::keys::FileKeyStore;
use crate::keys::KdfParams;
use crate::keys::KeyInfo;
use crate::keys::KeyStore;
use crate::keys::SigningAlgo;
use crate::models::address::AccAddress;
use crate::models::coins::Coins;
use crate::models::coins::ShareFraction;
use crate::models::tx::BroadcastResult;
use crate::pool::AccountPool;
use crate::pool::DEFAULT_SPAM_PREFIX;
use crate::provision::FundingPolicy;
use crate::provision::ProvisionRequest;
use crate::provision::Provisioner;

pub const BINARY_NAME: &str = "thorchainspam";

/// Top-level CLI args
#[derive(Debug, Clone, Parser)]
#[clap(name = BINARY_NAME, version, about = "Generates transaction load on a thorchain network")]
pub struct Cli {
    #[clap(flatten)]
    pub args: Args,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Dump shell completions.
    Completions,

    /// Manage spam accounts.
    #[clap(subcommand)]
    Account(AccountCommand),

    /// Send spam transactions.
    #[clap(subcommand)]
    Txs(TxsCommand),

    /// Manage keys in the local key store.
    #[clap(subcommand)]
    Keys(KeysCommand),

    /// Serve an in-process chain over RPC, for local testing.
    Devnet {
        #[clap(long, default_value = "127.0.0.1:26658")]
        listen: SocketAddr,

        /// Initial balance, e.g. --genesis thor1...=1000000rune,500bnb
        #[clap(long)]
        genesis: Vec<GenesisAccount>,
    },

    /// Serve `POST /clp`, signing with the local key store and
    /// broadcasting through --node.
    RestServer {
        #[clap(long, default_value = "127.0.0.1:1317")]
        listen: SocketAddr,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum AccountCommand {
    /// Ensure that at least k spam accounts exist, creating and funding the
    /// missing ones from --from.
    Ensure {
        /// Number of spam accounts to have.
        #[clap(long)]
        k: usize,

        #[clap(long, default_value = DEFAULT_SPAM_PREFIX)]
        spam_prefix: String,

        /// Password that new spam accounts are sealed with.
        #[clap(long, default_value = "")]
        spam_password: String,

        /// Password of the --from key.
        #[clap(long, default_value = "")]
        sign_password: String,

        /// Coins every new account receives, e.g. 1000rune,10bnb. Required
        /// when accounts are missing.
        #[clap(long)]
        amount: Option<Coins>,

        /// Most transfers per funding transaction.
        #[clap(long, default_value_t = FundingPolicy::default().batch_size)]
        batch_size: usize,

        #[clap(long, default_value_t = FundingPolicy::default().gas_per_msg)]
        gas_per_msg: u64,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum TxsCommand {
    /// Let every spam account send a random share of its coins to a random
    /// spam account.
    Send {
        #[clap(long, default_value = DEFAULT_SPAM_PREFIX)]
        spam_prefix: String,

        #[clap(long, default_value = DEFAULT_SPAM_PASSWORD)]
        spam_password: String,

        /// Most accounts at work at once.
        #[clap(long, default_value_t = DispatchPolicy::default().concurrency)]
        concurrency: usize,

        /// Largest share of its balance an account sends.
        #[clap(long, default_value = "0.5")]
        max_share: ShareFraction,

        #[clap(long, default_value_t = DispatchPolicy::default().gas_per_tx)]
        gas: u64,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum KeysCommand {
    /// Generate a new key.
    Add {
        name: String,

        #[clap(long)]
        password: String,
    },

    /// List all keys.
    List,

    /// Show one key.
    Show { name: String },
}

/// An `<address>=<coins>` pair given to `devnet --genesis`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: AccAddress,
    pub coins: Coins,
}

impl FromStr for GenesisAccount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, coins) = s
            .split_once('=')
            .with_context(|| format!("expected <address>=<coins>, got {s:?}"))?;
        Ok(Self {
            address: address.trim().parse()?,
            coins: coins.trim().parse()?,
        })
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let Cli { args, command } = cli;

    match command {
        Command::Completions => {
            if let Some(shell) = Shell::from_env() {
                generate(shell, &mut Cli::command(), BINARY_NAME, &mut stdout());
                return Ok(());
            }
            bail!("Unknown shell. Shell completions not available.")
        }
        Command::Account(AccountCommand::Ensure {
            k,
            spam_prefix,
            spam_password,
            sign_password,
            amount,
            batch_size,
            gas_per_msg,
        }) => {
            check_ensure_passwords(&spam_password, &sign_password)?;
            ensure!(batch_size > 0, "--batch-size must be at least 1");
            let policy = FundingPolicy {
                batch_size,
                gas_per_msg,
            };

            let keystore = open_keystore(&args, KdfParams::throwaway()).await?;
            let pool = AccountPool::new(keystore.clone(), spam_prefix);
            let outcome = ensure_accounts(
                &args,
                pool,
                k,
                amount,
                policy,
                Zeroizing::new(spam_password),
                Zeroizing::new(sign_password),
            )
            .await;
            close_keystore(keystore);
            outcome?;
            println!("Done.");
        }
        Command::Txs(TxsCommand::Send {
            spam_prefix,
            spam_password,
            concurrency,
            max_share,
            gas,
        }) => {
            let policy = DispatchPolicy {
                concurrency,
                max_share,
                gas_per_tx: gas,
            };

            let keystore = open_keystore(&args, KdfParams::default()).await?;
            let outcome = send_spam(&args, keystore.clone(), spam_prefix, spam_password, policy).await;
            close_keystore(keystore);
            outcome?;
            println!("Done.");
        }
        Command::Keys(keys_command) => {
            let keystore = FileKeyStore::open(keys_dir(&args)?, KdfParams::default()).await?;
            let outcome = manage_keys(&args, &keystore, keys_command).await;
            keystore.close();
            outcome?;
        }
        Command::Devnet { listen, genesis } => {
            let chain = LocalChain::new(
                args.chain_id.clone(),
                genesis.into_iter().map(|g| (g.address, g.coins)),
            );
            let (local_addr, server) = rpc::serve(chain, listen).await?;
            println!("Devnet {} serving on {local_addr}", args.chain_id);

            tokio::signal::ctrl_c().await?;
            info!("Shutting down devnet");
            server.abort();
        }
        Command::RestServer { listen } => {
            let keystore: Arc<dyn KeyStore> = open_keystore(&args, KdfParams::default()).await?;
            let backend = RpcBackend::connect(args.node).await?;
            let listener = TcpListener::bind(listen)
                .await
                .with_context(|| format!("Failed to bind REST server to {listen}"))?;
            run_rest_server(listener, RestState::new(keystore, Arc::new(backend))).await?;
        }
    }

    Ok(())
}

/// Checked before the key store is touched.
pub(crate) fn check_ensure_passwords(spam_password: &str, sign_password: &str) -> Result<()> {
    ensure!(!spam_password.is_empty(), "--spam-password is required");
    ensure!(!sign_password.is_empty(), "--sign-password is required");
    Ok(())
}

/// Only needed once accounts have to be created and funded.
pub(crate) fn funding_source(args: &Args) -> Result<String> {
    match &args.from {
        Some(from) if !from.is_empty() => Ok(from.clone()),
        _ => bail!("--from is required"),
    }
}

/// Renders a broadcast result the way the chain's own CLI does.
pub fn format_broadcast(result: &BroadcastResult, json: bool, print_response: bool) -> Result<String> {
    let Some(height) = result.height else {
        if json {
            return Ok(serde_json::json!({ "TxHash": result.hash }).to_string());
        }
        return Ok(format!("Async tx sent. tx hash: {}", result.hash));
    };

    if json {
        let output = serde_json::json!({
            "Height": height,
            "TxHash": result.hash,
            "Response": result.deliver_tx,
        });
        return Ok(serde_json::to_string(&output)?);
    }

    let mut line = format!("Committed at block {height}. Hash: {}", result.hash);
    if print_response {
        if let Some(response) = &result.deliver_tx {
            line.push_str(&format!(" Response:{response:?}"));
        }
    }
    Ok(line)
}

fn keys_dir(args: &Args) -> Result<std::path::PathBuf> {
    Ok(DataDirectory::get(args.home.clone())?.keys_dir_path())
}

/// `kdf` only applies to keys created through the returned store.
async fn open_keystore(args: &Args, kdf: KdfParams) -> Result<Arc<FileKeyStore>> {
    let dir = keys_dir(args)?;
    let keystore = FileKeyStore::open(dir.clone(), kdf)
        .await
        .with_context(|| format!("Could not open key store at {}", dir.display()))?;
    Ok(Arc::new(keystore))
}

fn close_keystore(keystore: Arc<FileKeyStore>) {
    match Arc::try_unwrap(keystore) {
        Ok(keystore) => keystore.close(),
        Err(_) => warn!("Key store still in use, not closing"),
    }
}

async fn connect(args: &Args, keystore: Arc<dyn KeyStore>) -> Result<Arc<dyn ChainClient>> {
    let backend = RpcBackend::connect(args.node)
        .await
        .context("This command requires a connection to a chain node. Is --node right?")?;
    Ok(Arc::new(KeybaseClient::new(
        keystore,
        backend,
        args.chain_id.clone(),
    )))
}

async fn ensure_accounts(
    args: &Args,
    pool: AccountPool,
    k: usize,
    amount: Option<Coins>,
    policy: FundingPolicy,
    spam_password: Zeroizing<String>,
    sign_password: Zeroizing<String>,
) -> Result<()> {
    let existing = pool.count().await?;
    if k <= existing {
        info!("Found {existing} spam accounts, will not create additional ones");
        return Ok(());
    }

    let source_name = funding_source(args)?;
    let amount = amount.context("--amount is required")?;
    ensure!(
        amount.is_all_positive(),
        "--amount must hold a positive amount of every denomination"
    );
    let request = ProvisionRequest {
        target: k,
        amount,
        source_name,
        spam_password,
        sign_password,
        mode: args.broadcast_mode(),
    };

    let chain = connect(args, pool.keystore().clone()).await?;
    let report = Provisioner::new(pool, chain, policy).ensure(&request).await?;
    for tx in &report.funding_txs {
        println!("{}", format_broadcast(tx, args.json, args.print_response)?);
    }
    Ok(())
}

async fn send_spam(
    args: &Args,
    keystore: Arc<FileKeyStore>,
    spam_prefix: String,
    spam_password: String,
    policy: DispatchPolicy,
) -> Result<()> {
    let pool = AccountPool::new(keystore.clone(), spam_prefix);
    if pool.count().await? == 0 {
        bail!(DispatchError::EmptyPool);
    }

    let chain = connect(args, keystore).await?;
    let dispatcher = SpamDispatcher::new(
        pool,
        chain,
        policy,
        Zeroizing::new(spam_password),
        args.broadcast_mode(),
    );
    dispatcher.run_round().await?;
    Ok(())
}

async fn manage_keys(args: &Args, keystore: &FileKeyStore, command: KeysCommand) -> Result<()> {
    match command {
        KeysCommand::Add { name, password } => {
            ensure!(!password.is_empty(), "--password must not be empty");
            let key = keystore.create(&name, &password, SigningAlgo::Secp256k1).await?;
            print_keys(args, &[key])?;
        }
        KeysCommand::List => {
            print_keys(args, &keystore.list().await?)?;
        }
        KeysCommand::Show { name } => {
            let key = keystore.get(&name).await?;
            print_keys(args, &[key])?;
        }
    }
    Ok(())
}

fn print_keys(args: &Args, keys: &[KeyInfo]) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(keys)?);
        return Ok(());
    }
    for key in keys {
        println!("{}\t{}\t{}\t{}", key.name, key.algo, key.address, key.pub_key_hex());
    }
    Ok(())
}
