//! tarpc service exposing a chain over TCP with JSON framing.

use std::net::SocketAddr;

use async_trait::async_trait;
use futures::future;
use futures::Future;
use futures::StreamExt;
use tarpc::client;
use tarpc::context;
use tarpc::server;
use tarpc::server::Channel;
use tarpc::tokio_serde::formats::Json;
use tokio::task::JoinHandle;
use tracing::info;

use super::local::LocalChain;
use super::ChainBackend;
use super::ChainError;
use crate::models::account::AccountState;
use crate::models::address::AccAddress;
use crate::models::tx::BroadcastMode;
use crate::models::tx::BroadcastResult;
use crate::models::tx::StdTx;
use crate::models::tx::TxRejection;

const MAX_CHANNELS: usize = 64;

#[tarpc::service]
pub trait ChainRpc {
    /// The account at `address`, if the chain has seen it.
    async fn query_account(address: AccAddress) -> Option<AccountState>;

    async fn broadcast_tx(tx: StdTx, mode: BroadcastMode) -> Result<BroadcastResult, TxRejection>;
}

#[derive(Clone, Debug)]
pub struct ChainRpcServer {
    chain: LocalChain,
}

impl ChainRpcServer {
    pub fn new(chain: LocalChain) -> Self {
        Self { chain }
    }
}

impl ChainRpc for ChainRpcServer {
    async fn query_account(self, _: context::Context, address: AccAddress) -> Option<AccountState> {
        self.chain.account(&address).await
    }

    async fn broadcast_tx(
        self,
        _: context::Context,
        tx: StdTx,
        mode: BroadcastMode,
    ) -> Result<BroadcastResult, TxRejection> {
        self.chain.deliver(tx, mode).await
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

/// Binds `listen_addr` and serves `chain` on it until the returned task is
/// aborted. Returns the bound address, which differs from `listen_addr` when
/// that asked for port 0.
pub async fn serve(
    chain: LocalChain,
    listen_addr: SocketAddr,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let mut listener = tarpc::serde_transport::tcp::listen(listen_addr, Json::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);
    let local_addr = listener.local_addr();
    info!("Chain RPC listening on {local_addr}");

    let handle = tokio::spawn(async move {
        listener
            // Ignore accept errors.
            .filter_map(|r| future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .map(move |channel| {
                let server = ChainRpcServer::new(chain.clone());
                channel.execute(server.serve()).for_each(spawn)
            })
            .buffer_unordered(MAX_CHANNELS)
            .for_each(|_| async {})
            .await;
    });

    Ok((local_addr, handle))
}

/// A chain reached through [`ChainRpc`].
#[derive(Clone, Debug)]
pub struct RpcBackend {
    client: ChainRpcClient,
}

impl RpcBackend {
    pub async fn connect(server_addr: SocketAddr) -> Result<Self, ChainError> {
        let transport = tarpc::serde_transport::tcp::connect(server_addr, Json::default)
            .await
            .map_err(|e| ChainError::Query(format!("could not connect to {server_addr}: {e}")))?;
        let client = ChainRpcClient::new(client::Config::default(), transport).spawn();
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainBackend for RpcBackend {
    async fn query_account(
        &self,
        address: AccAddress,
    ) -> Result<Option<AccountState>, ChainError> {
        self.client
            .query_account(context::current(), address)
            .await
            .map_err(|e| ChainError::Query(e.to_string()))
    }

    async fn broadcast(&self, tx: StdTx, mode: BroadcastMode) -> Result<BroadcastResult, ChainError> {
        let result = self
            .client
            .broadcast_tx(context::current(), tx, mode)
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::coins::Coins;
    use crate::models::msg::Msg;
    use crate::models::msg::MsgSend;
    use crate::tests::shared::signed_tx;
    use crate::tests::shared::test_key;

    #[tokio::test]
    async fn query_and_broadcast_over_tcp() {
        let (key, alice) = test_key(1);
        let (_, bob) = test_key(2);
        let chain = LocalChain::new("thorchain", [(alice, "100rune".parse().unwrap())]);
        let (addr, server) = serve(chain.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let backend = RpcBackend::connect(addr).await.unwrap();
        let alice_state = backend.query_account(alice).await.unwrap().unwrap();
        assert_eq!("100rune".parse::<Coins>().unwrap(), alice_state.coins);
        assert_eq!(None, backend.query_account(bob).await.unwrap());

        let msgs = vec![Msg::Send(MsgSend {
            from_address: alice,
            to_address: bob,
            amount: "25rune".parse().unwrap(),
        })];
        let tx = signed_tx(&key, "thorchain", 0, 0, 10_000, msgs);
        let result = backend.broadcast(tx.clone(), BroadcastMode::Sync).await.unwrap();
        assert_eq!(Some(1), result.height);
        assert_eq!(tx.hash().unwrap(), result.hash);

        // replaying is refused by the chain and surfaces as a rejection
        assert!(matches!(
            backend.broadcast(tx, BroadcastMode::Sync).await,
            Err(ChainError::Rejected(TxRejection::WrongSequence { .. }))
        ));
        assert_eq!(
            "25rune".parse::<Coins>().unwrap(),
            chain.account(&bob).await.unwrap().coins
        );

        server.abort();
    }
}
