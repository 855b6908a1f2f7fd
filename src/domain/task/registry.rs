//! Capability Registry
//!
//! Maps task names to the code that performs them. Built once at startup,
//! read-only afterwards. Lookups ignore ASCII case.

use super::model::TaskOutcome;
use crate::config::AppConfig;
use crate::error::{CapabilityError, TaskError};
use crate::infrastructure::proxy::Proxy;
use crate::infrastructure::session::{ChainConnection, HttpSession};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Everything a capability may use for one wallet
#[derive(Clone)]
pub struct WalletContext {
    /// 1-based account number
    pub account_index: usize,
    /// Wallet secret as stored in the ledger
    pub wallet_id: String,
    pub proxy: Option<Proxy>,
    pub http: HttpSession,
    pub chain: ChainConnection,
    pub config: Arc<AppConfig>,
}

impl fmt::Debug for WalletContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletContext")
            .field("account_index", &self.account_index)
            .field("wallet", &super::model::mask_secret(&self.wallet_id))
            .field("proxy", &self.proxy.as_ref().map(Proxy::server))
            .finish_non_exhaustive()
    }
}

/// A named unit of work
///
/// `Ok` carries the tagged outcome for expected conditions; `Err` is reserved
/// for unexpected faults and counts as a failed attempt.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn execute(&self, ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError>;
}

/// Boxed future returned by closure capabilities
pub type CapabilityFuture<'a> = BoxFuture<'a, Result<TaskOutcome, CapabilityError>>;

/// Adapts a closure into a [`Capability`]
pub struct FnCapability<F> {
    f: F,
}

impl<F> FnCapability<F>
where
    F: for<'a> Fn(&'a WalletContext) -> CapabilityFuture<'a> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: for<'a> Fn(&'a WalletContext) -> CapabilityFuture<'a> + Send + Sync,
{
    async fn execute(&self, ctx: &WalletContext) -> Result<TaskOutcome, CapabilityError> {
        (self.f)(ctx).await
    }
}

/// Collects capabilities before the registry is frozen
#[derive(Default)]
pub struct CapabilityRegistryBuilder {
    entries: BTreeMap<String, (String, Arc<dyn Capability>)>,
}

impl CapabilityRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability. Names differing only in case collide.
    pub fn register(
        mut self,
        name: impl Into<String>,
        capability: impl Capability + 'static,
    ) -> Result<Self, TaskError> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        if self.entries.contains_key(&key) {
            return Err(TaskError::DuplicateTask { name });
        }
        self.entries.insert(key, (name, Arc::new(capability)));
        Ok(self)
    }

    /// Add a closure capability
    pub fn register_fn<F>(self, name: impl Into<String>, f: F) -> Result<Self, TaskError>
    where
        F: for<'a> Fn(&'a WalletContext) -> CapabilityFuture<'a> + Send + Sync + 'static,
    {
        self.register(name, FnCapability::new(f))
    }

    pub fn build(self) -> CapabilityRegistry {
        tracing::debug!(count = self.entries.len(), "Capability registry built");
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable name → capability table
pub struct CapabilityRegistry {
    entries: BTreeMap<String, (String, Arc<dyn Capability>)>,
}

impl CapabilityRegistry {
    pub fn builder() -> CapabilityRegistryBuilder {
        CapabilityRegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, TaskError> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, capability)| Arc::clone(capability))
            .ok_or_else(|| TaskError::UnknownTask {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names as written at registration, sorted
    pub fn names(&self) -> Vec<&str> {
        self.entries.values().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Context with offline network handles
    pub fn context(account_index: usize, wallet_id: &str) -> WalletContext {
        let http = HttpSession::new(None, false, Duration::from_secs(1)).unwrap();
        let chain = ChainConnection::unchecked(
            http.client().clone(),
            "http://127.0.0.1:9".to_string(),
            Some(1),
        );
        WalletContext {
            account_index,
            wallet_id: wallet_id.to_string(),
            proxy: None,
            http,
            chain,
            config: Arc::new(AppConfig::default()),
        }
    }
}
