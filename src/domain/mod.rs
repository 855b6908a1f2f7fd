//! Domain Layer
//!
//! Core business logic: task plans, per-account execution, and scheduling.

pub mod task;
