use serde::Deserialize;
use serde::Serialize;

use super::address::AccAddress;
use super::coins::Coins;
use crate::clp::ClpMsg;

/// Bank transfer of `amount` from one account to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from_address: AccAddress,
    pub to_address: AccAddress,
    pub amount: Coins,
}

/// Every message kind a transaction can carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    Send(MsgSend),
    Clp(ClpMsg),
}

impl Msg {
    /// The module that handles this message.
    pub fn route(&self) -> &'static str {
        match self {
            Msg::Send(_) => "bank",
            Msg::Clp(_) => crate::clp::ROUTE,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Msg::Send(_) => "send",
            Msg::Clp(msg) => msg.type_name(),
        }
    }

    /// The account that must sign a transaction carrying this message.
    pub fn signer(&self) -> AccAddress {
        match self {
            Msg::Send(send) => send.from_address,
            Msg::Clp(msg) => msg.sender(),
        }
    }
}

impl From<MsgSend> for Msg {
    fn from(send: MsgSend) -> Self {
        Msg::Send(send)
    }
}

impl From<ClpMsg> for Msg {
    fn from(msg: ClpMsg) -> Self {
        Msg::Clp(msg)
    }
}
