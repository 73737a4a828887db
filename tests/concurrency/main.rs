//! Concurrency stress for the dispatcher
//!
//! Many submitters, mixed sync/async traffic, several adapters. Checks that
//! the bus never sees two operations at once per adapter and that every
//! chain is accounted for.

#[path = "../common/mod.rs"]
mod common;
