use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::models::tx::BroadcastMode;

pub const DEFAULT_CHAIN_ID: &str = "thorchain";
pub const DEFAULT_NODE_ADDRESS: &str = "127.0.0.1:26658";

/// Options shared by every command.
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Directory holding the local key store. Defaults to the user's data
    /// directory.
    #[clap(long, value_name = "dir")]
    pub home: Option<PathBuf>,

    /// Chain RPC server to query and broadcast through.
    #[clap(long, default_value = DEFAULT_NODE_ADDRESS, value_name = "addr")]
    pub node: SocketAddr,

    /// Chain id that transactions are signed for.
    #[clap(long, default_value = DEFAULT_CHAIN_ID)]
    pub chain_id: String,

    /// Name of the local key that funds new accounts.
    #[clap(long, value_name = "name")]
    pub from: Option<String>,

    /// Return right after the node accepted the transaction instead of
    /// waiting for it to be committed.
    #[clap(long = "async")]
    pub broadcast_async: bool,

    /// Print broadcast results as JSON.
    #[clap(long)]
    pub json: bool,

    /// Include the delivery response when printing a committed transaction.
    #[clap(long)]
    pub print_response: bool,

    /// Enable tokio tracing for consumption by the tokio-console application.
    /// Requires the `tokio-console` cargo feature.
    #[clap(long)]
    pub tokio_console: bool,
}

impl Args {
    pub fn broadcast_mode(&self) -> BroadcastMode {
        if self.broadcast_async {
            BroadcastMode::Async
        } else {
            BroadcastMode::Sync
        }
    }
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}

#[cfg(test)]
mod cli_args_tests {
    use super::*;

    #[test]
    fn default_args_test() {
        let default_args = Args::default();

        assert_eq!(None, default_args.home);
        assert_eq!(
            DEFAULT_NODE_ADDRESS.parse::<SocketAddr>().unwrap(),
            default_args.node
        );
        assert_eq!("thorchain", default_args.chain_id);
        assert_eq!(None, default_args.from);
        assert_eq!(BroadcastMode::Sync, default_args.broadcast_mode());
        assert!(!default_args.json);
        assert!(!default_args.print_response);
    }

    #[test]
    fn async_flag_selects_async_mode() {
        let args = Args::parse_from(["thorchainspam", "--async", "--from", "treasury"]);
        assert_eq!(BroadcastMode::Async, args.broadcast_mode());
        assert_eq!(Some("treasury".to_string()), args.from);
    }
}
