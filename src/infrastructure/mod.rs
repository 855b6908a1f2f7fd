//! Infrastructure Layer
//!
//! Storage, input files, network sessions, wallet addresses, notifications
//! and reports.

pub mod backoff;
pub mod input;
pub mod notify;
pub mod proxy;
pub mod report;
pub mod session;
pub mod storage;
pub mod wallet;
