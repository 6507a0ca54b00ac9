use serde::Deserialize;
use serde::Serialize;

use super::address::AccAddress;
use super::coins::Coins;

/// The chain's view of one account, as returned by an account query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: AccAddress,
    pub coins: Coins,
    pub account_number: u64,
    pub sequence: u64,
}

impl AccountState {
    pub fn new(address: AccAddress, account_number: u64) -> Self {
        Self {
            address,
            coins: Coins::empty(),
            account_number,
            sequence: 0,
        }
    }
}
