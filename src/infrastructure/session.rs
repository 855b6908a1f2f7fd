//! Per-wallet network resources
//!
//! Every account runner acquires one [`AccountResources`] (an HTTP session
//! bound to the wallet's proxy plus a JSON-RPC chain connection) and hands it
//! back to its [`ResourceProvider`] exactly once when it finishes.

use crate::config::AppConfig;
use crate::error::{CapabilityError, ResourceError, ResourceResult};
use crate::infrastructure::proxy::Proxy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Probes per RPC endpoint before moving to the next one
const PROBES_PER_ENDPOINT: u32 = 3;
/// Delay between probes of the same endpoint
const PROBE_DELAY: Duration = Duration::from_secs(1);

fn build_client(
    proxy: Option<&Proxy>,
    skip_tls_verify: bool,
    timeout: Duration,
) -> ResourceResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(skip_tls_verify);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_url())?);
    }
    Ok(builder.build()?)
}

struct HttpInner {
    client: reqwest::Client,
    proxy: Option<Proxy>,
    closed: AtomicBool,
}

/// HTTP client bound to one wallet's proxy
#[derive(Clone)]
pub struct HttpSession {
    inner: Arc<HttpInner>,
}

impl HttpSession {
    pub fn new(proxy: Option<Proxy>, skip_tls_verify: bool, timeout: Duration) -> ResourceResult<Self> {
        let client = build_client(proxy.as_ref(), skip_tls_verify, timeout)?;
        Ok(Self {
            inner: Arc::new(HttpInner {
                client,
                proxy,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.inner.client
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.inner.proxy.as_ref()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Mark the session closed. Returns `true` only on the first call.
    pub fn cleanup(&self) -> bool {
        !self.inner.closed.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("proxy", &self.inner.proxy.as_ref().map(Proxy::server))
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// How the chain connection uses the wallet's proxy and TLS
#[derive(Debug, Clone, Copy)]
pub struct ChainOptions {
    pub use_proxy: bool,
    pub skip_tls_verify: bool,
    pub timeout: Duration,
}

impl ChainOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            use_proxy: config.others.use_proxy_for_rpc,
            skip_tls_verify: config.others.skip_ssl_verification,
            timeout: Duration::from_secs(config.others.request_timeout_secs),
        }
    }
}

struct ChainInner {
    client: reqwest::Client,
    rpc_url: String,
    chain_id: Option<u64>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// JSON-RPC connection to the target chain
#[derive(Clone)]
pub struct ChainConnection {
    inner: Arc<ChainInner>,
}

impl ChainConnection {
    /// Try each URL in order, probing `eth_chainId` up to three times per URL
    pub async fn connect(
        rpc_urls: &[String],
        proxy: Option<&Proxy>,
        options: ChainOptions,
    ) -> ResourceResult<Self> {
        if rpc_urls.is_empty() {
            return Err(ResourceError::NoRpcEndpoints);
        }
        let proxy = if options.use_proxy { proxy } else { None };
        let client = build_client(proxy, options.skip_tls_verify, options.timeout)?;

        for rpc_url in rpc_urls {
            for probe in 1..=PROBES_PER_ENDPOINT {
                let candidate = Self::unchecked(client.clone(), rpc_url.clone(), None);
                match candidate.chain_id().await {
                    Ok(chain_id) => {
                        tracing::debug!(rpc = %rpc_url, chain_id, "Connected to RPC");
                        return Ok(Self::unchecked(client, rpc_url.clone(), Some(chain_id)));
                    }
                    Err(e) => {
                        tracing::warn!(
                            rpc = %rpc_url,
                            probe,
                            probes = PROBES_PER_ENDPOINT,
                            error = %e,
                            "RPC probe failed"
                        );
                        if probe < PROBES_PER_ENDPOINT {
                            tokio::time::sleep(PROBE_DELAY).await;
                        }
                    }
                }
            }
        }

        Err(ResourceError::RpcUnavailable {
            tried: rpc_urls.len(),
        })
    }

    /// Wrap an endpoint without probing it
    pub fn unchecked(client: reqwest::Client, rpc_url: String, chain_id: Option<u64>) -> Self {
        Self {
            inner: Arc::new(ChainInner {
                client,
                rpc_url,
                chain_id,
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.inner.rpc_url
    }

    /// Chain id observed while connecting
    pub fn known_chain_id(&self) -> Option<u64> {
        self.inner.chain_id
    }

    /// Raw JSON-RPC call
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CapabilityError> {
        if self.is_closed() {
            return Err(CapabilityError::Rpc("connection closed".into()));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response: Value = self
            .inner
            .client
            .post(&self.inner.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(CapabilityError::Rpc(format!("{}: {}", method, message)));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| CapabilityError::UnexpectedResponse(format!("{} returned no result", method)))
    }

    pub async fn chain_id(&self) -> Result<u64, CapabilityError> {
        let value = self.call("eth_chainId", json!([])).await?;
        parse_quantity(&value)
    }

    pub async fn block_number(&self) -> Result<u64, CapabilityError> {
        let value = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&value)
    }

    /// Native balance in wei at the latest block
    pub async fn balance(&self, address: &str) -> Result<u128, CapabilityError> {
        let value = self.call("eth_getBalance", json!([address, "latest"])).await?;
        parse_wide_quantity(&value)
    }

    pub async fn transaction_count(&self, address: &str) -> Result<u64, CapabilityError> {
        let value = self
            .call("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        parse_quantity(&value)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Mark the connection closed. Returns `true` only on the first call.
    pub fn cleanup(&self) -> bool {
        !self.inner.closed.swap(true, Ordering::AcqRel)
    }
}

impl std::fmt::Debug for ChainConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConnection")
            .field("rpc_url", &self.inner.rpc_url)
            .field("chain_id", &self.inner.chain_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Hex quantity (`"0x1a"`) to integer
pub fn parse_quantity(value: &Value) -> Result<u64, CapabilityError> {
    let text = quantity_text(value)?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|e| CapabilityError::UnexpectedResponse(format!("bad quantity '{}': {}", text, e)))
}

/// Like [`parse_quantity`], for values such as balances that overflow `u64`
pub fn parse_wide_quantity(value: &Value) -> Result<u128, CapabilityError> {
    let text = quantity_text(value)?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u128::from_str_radix(digits, 16)
        .map_err(|e| CapabilityError::UnexpectedResponse(format!("bad quantity '{}': {}", text, e)))
}

fn quantity_text(value: &Value) -> Result<&str, CapabilityError> {
    value
        .as_str()
        .ok_or_else(|| CapabilityError::UnexpectedResponse(format!("expected hex string, got {}", value)))
}

/// Everything one account runner holds while it works
#[derive(Debug, Clone)]
pub struct AccountResources {
    pub http: HttpSession,
    pub chain: ChainConnection,
}

impl AccountResources {
    /// Close both handles. Safe to call more than once.
    pub fn cleanup(&self) {
        let http = self.http.cleanup();
        let chain = self.chain.cleanup();
        if http || chain {
            tracing::debug!(rpc = self.chain.rpc_url(), "Released account resources");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.http.is_closed() && self.chain.is_closed()
    }
}

/// Source of per-wallet resources
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn acquire(&self, account_index: usize, proxy: Option<&Proxy>) -> ResourceResult<AccountResources>;

    /// Called exactly once per successful `acquire`
    async fn release(&self, resources: AccountResources) {
        resources.cleanup();
    }
}

/// Builds real HTTP and RPC handles from configuration
pub struct DefaultResourceProvider {
    config: Arc<AppConfig>,
}

impl DefaultResourceProvider {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ResourceProvider for DefaultResourceProvider {
    async fn acquire(&self, account_index: usize, proxy: Option<&Proxy>) -> ResourceResult<AccountResources> {
        let options = ChainOptions::from_config(&self.config);
        let http = HttpSession::new(proxy.cloned(), options.skip_tls_verify, options.timeout)?;
        let chain = ChainConnection::connect(&self.config.rpcs.chain, proxy, options).await?;
        tracing::debug!(account = account_index, rpc = chain.rpc_url(), "Acquired account resources");
        Ok(AccountResources { http, chain })
    }
}
