//! Continuous liquidity pools: the chain's one custom message module.

pub mod rest;

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::models::address::AccAddress;
use crate::models::msg::Msg;

/// Route of every CLP message.
pub const ROUTE: &str = "clp";

pub const MAX_RESERVE_RATIO: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClpMsg {
    /// Stores `test` as the module's last test string.
    Test { sender: AccAddress, test: String },

    /// Registers a new pool under `ticker`.
    Create {
        sender: AccAddress,
        ticker: String,
        name: String,
        reserve_ratio: u32,
    },
}

impl ClpMsg {
    pub fn type_name(&self) -> &'static str {
        match self {
            ClpMsg::Test { .. } => "test",
            ClpMsg::Create { .. } => "create_clp",
        }
    }

    pub fn sender(&self) -> AccAddress {
        match self {
            ClpMsg::Test { sender, .. } | ClpMsg::Create { sender, .. } => *sender,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clp {
    pub creator: AccAddress,
    pub ticker: String,
    pub name: String,
    pub reserve_ratio: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ClpError {
    #[error("unrecognized {route} message type: {type_name}")]
    UnknownRequest {
        route: &'static str,
        type_name: &'static str,
    },

    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("a CLP with ticker {0} already exists")]
    DuplicateTicker(String),

    #[error("reserve ratio must lie in 1..={MAX_RESERVE_RATIO}, got {0}")]
    InvalidReserveRatio(u32),
}

/// CLP module state.
#[derive(Clone, Debug, Default)]
pub struct ClpKeeper {
    last_test: Option<String>,
    clps: BTreeMap<String, Clp>,
}

impl ClpKeeper {
    pub fn last_test(&self) -> Option<&str> {
        self.last_test.as_deref()
    }

    pub fn clp(&self, ticker: &str) -> Option<&Clp> {
        self.clps.get(ticker)
    }

    fn set_test(&mut self, test: &str) {
        self.last_test = Some(test.to_string());
    }

    fn create(
        &mut self,
        creator: AccAddress,
        ticker: &str,
        name: &str,
        reserve_ratio: u32,
    ) -> Result<(), ClpError> {
        if ticker.is_empty() {
            return Err(ClpError::EmptyTicker);
        }
        if !(1..=MAX_RESERVE_RATIO).contains(&reserve_ratio) {
            return Err(ClpError::InvalidReserveRatio(reserve_ratio));
        }
        if self.clps.contains_key(ticker) {
            return Err(ClpError::DuplicateTicker(ticker.to_string()));
        }

        self.clps.insert(
            ticker.to_string(),
            Clp {
                creator,
                ticker: ticker.to_string(),
                name: name.to_string(),
                reserve_ratio,
            },
        );
        Ok(())
    }
}

/// Applies a message routed to the CLP module.
pub fn handle_msg(keeper: &mut ClpKeeper, msg: &Msg) -> Result<(), ClpError> {
    match msg {
        Msg::Clp(ClpMsg::Test { test, .. }) => {
            keeper.set_test(test);
            info!("test message handled");
            Ok(())
        }
        Msg::Clp(ClpMsg::Create {
            sender,
            ticker,
            name,
            reserve_ratio,
        }) => {
            keeper.create(*sender, ticker, name, *reserve_ratio)?;
            info!(ticker = %ticker, "new CLP created");
            Ok(())
        }
        Msg::Send(_) => Err(ClpError::UnknownRequest {
            route: msg.route(),
            type_name: msg.type_name(),
        }),
    }
}
