//! farmhand
//!
//! Multi-account testnet task runner:
//! - Durable per-wallet task ledger (SQLite) with idempotent resumption
//! - Randomized task plans built from presets
//! - Name-based capability dispatch with tagged outcomes and retries
//! - Bounded-concurrency account scheduling with isolated failures

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod integrations;
pub mod logging;

pub use config::AppConfig;
pub use error::{FarmError, FarmResult};
