//! Wallet addresses and on-chain statistics

use super::session::ChainConnection;
use crate::error::CapabilityError;
use alloy_signer_local::PrivateKeySigner;
use serde::Serialize;

const WEI_PER_NATIVE: f64 = 1e18;

/// Checksummed address of a hex private key.
///
/// `None` for recovery phrases and anything that is not a valid secp256k1 key.
pub fn wallet_address(wallet_id: &str) -> Option<String> {
    let hex = wallet_id.trim();
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    digits
        .parse::<PrivateKeySigner>()
        .ok()
        .map(|signer| signer.address().to_string())
}

/// Balance and nonce of one wallet at the end of its run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletStats {
    pub address: String,
    /// Decimal wei
    pub balance_wei: String,
    /// Native units, for display
    pub balance: f64,
    pub transaction_count: u64,
}

impl WalletStats {
    pub fn new(address: String, balance_wei: u128, transaction_count: u64) -> Self {
        Self {
            address,
            balance_wei: balance_wei.to_string(),
            balance: balance_wei as f64 / WEI_PER_NATIVE,
            transaction_count,
        }
    }
}

/// Query balance and transaction count for `address`
pub async fn fetch_stats(chain: &ChainConnection, address: &str) -> Result<WalletStats, CapabilityError> {
    let balance = chain.balance(address).await?;
    let transaction_count = chain.transaction_count(address).await?;
    Ok(WalletStats::new(address.to_string(), balance, transaction_count))
}

/// Best-effort statistics for one wallet; failures are logged and yield `None`
pub async fn collect_stats(chain: &ChainConnection, wallet_id: &str) -> Option<WalletStats> {
    let Some(address) = wallet_address(wallet_id) else {
        tracing::debug!("No address for this wallet, skipping statistics");
        return None;
    };
    match fetch_stats(chain, &address).await {
        Ok(stats) => {
            tracing::info!(
                address = %stats.address,
                balance = stats.balance,
                transactions = stats.transaction_count,
                "Wallet statistics"
            );
            Some(stats)
        }
        Err(e) => {
            tracing::warn!(address = %address, error = %e, "Could not collect wallet statistics");
            None
        }
    }
}
