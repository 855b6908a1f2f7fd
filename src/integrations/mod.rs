//! Built-in capabilities
//!
//! `skip` and `rpc_ping` are always available. Every `[integrations.<name>]`
//! table in the configuration adds one HTTP-backed task under `<name>`.

pub mod http;

use crate::config::AppConfig;
use crate::domain::task::{Capability, CapabilityRegistry, TaskOutcome, WalletContext};
use crate::error::{CapabilityError, FarmResult};
use crate::infrastructure::backoff::{retry_with_backoff, BackoffPolicy};
use async_trait::async_trait;

pub use http::HttpCapability;

/// Name of the no-op task
pub const SKIP_TASK: &str = "skip";
/// Name of the RPC liveness task
pub const RPC_PING_TASK: &str = "rpc_ping";

/// Placeholder task that always succeeds
pub struct Skip;

#[async_trait]
impl Capability for Skip {
    async fn execute(&self, _ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
        Ok(TaskOutcome::Success)
    }
}

/// Reads the latest block number through the wallet's chain connection
pub struct RpcPing {
    backoff: BackoffPolicy,
}

impl RpcPing {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }
}

#[async_trait]
impl Capability for RpcPing {
    async fn execute(&self, ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
        let block = retry_with_backoff(RPC_PING_TASK, self.backoff, || ctx.chain.block_number()).await?;
        tracing::info!(account = ctx.account_index, rpc = ctx.chain.rpc_url(), block, "RPC reachable");
        Ok(TaskOutcome::Success)
    }
}

/// Registry holding the built-ins plus configured HTTP integrations
pub fn builtin_registry(config: &AppConfig) -> FarmResult<CapabilityRegistry> {
    let backoff = BackoffPolicy::with_attempts(config.settings.request_attempts);
    let mut builder = CapabilityRegistry::builder()
        .register(SKIP_TASK, Skip)?
        .register(RPC_PING_TASK, RpcPing::new(backoff))?;

    for (name, integration) in &config.integrations {
        builder = builder.register(name.as_str(), HttpCapability::from_config(name, integration, backoff)?)?;
    }

    Ok(builder.build())
}
