#![allow(dead_code)]

pub mod logging;

use std::sync::Arc;

use thorchain_spam::chain::local::LocalChain;
use thorchain_spam::keys::KdfParams;
use thorchain_spam::keys::KeyInfo;
use thorchain_spam::keys::KeyStore;
use thorchain_spam::keys::MemoryKeyStore;
use thorchain_spam::keys::SigningAlgo;
use thorchain_spam::models::coins::Coins;

pub const CHAIN_ID: &str = "thorchain";
pub const TREASURY: &str = "treasury";
pub const TREASURY_PASSWORD: &str = "treasury-password";

pub fn coins(s: &str) -> Coins {
    s.parse().unwrap()
}

/// A key store holding a funding key and a chain where that key owns
/// `treasury_balance`.
pub async fn treasury_and_chain(treasury_balance: &str) -> (Arc<dyn KeyStore>, KeyInfo, LocalChain) {
    let keystore: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new(KdfParams::insecure()));
    let treasury = keystore
        .create(TREASURY, TREASURY_PASSWORD, SigningAlgo::Secp256k1)
        .await
        .unwrap();
    let chain = LocalChain::new(CHAIN_ID, [(treasury.address, coins(treasury_balance))]);
    (keystore, treasury, chain)
}
