// If code coverage tool `cargo-llvm-cov` is running with the nightly toolchain,
// enable the unstable “coverage” attribute, so `#[cfg(test)]` modules can be
// annotated with `#[cfg_attr(coverage_nightly, coverage(off))]`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod chain;
pub mod clp;
pub mod command;
pub mod config_models;
pub mod dispatch;
pub mod keys;
pub mod models;
pub mod pool;
pub mod provision;
