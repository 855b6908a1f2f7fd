//! Task Management
//!
//! Task model, plan generation, capability dispatch, and account scheduling.

pub mod model;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod scheduler;
pub mod selection;

pub use model::{
    derive_wallet_status, mask_secret, TaskEntry, TaskOutcome, TaskStatus, WalletRecord,
    WalletStatus,
};
pub use plan::{PlanGenerator, TaskGroup, TaskPlanSpec};
pub use progress::{LogProgress, ProgressSink, ProgressTracker};
pub use registry::{Capability, CapabilityRegistry, CapabilityRegistryBuilder, FnCapability, WalletContext};
pub use retry::{attempt, AttemptReport, RetryPolicy};
pub use runner::{AccountReport, AccountRunner, RunnerState};
pub use scheduler::{RunReport, Scheduler, SchedulerConfig};
pub use selection::{select_accounts, AccountSpec};
