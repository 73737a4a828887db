#[path = "../common/mod.rs"]
mod common;

mod cancellation;
mod chain_integrity;
mod pause_exclusivity;
mod scenarios;
