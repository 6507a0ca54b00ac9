pub mod account;
pub mod address;
pub mod coins;
pub mod msg;
pub mod tx;
