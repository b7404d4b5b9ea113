//! Core data types shared by all adapters
//!
//! Chains, positions, funding samples, swap quotes/fills and bridge
//! transfer handles. Amounts are plain `f64` in human units (USDC, ETH),
//! conversion to wire/base units happens inside each adapter.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// HTTP Client Constants
// =============================================================================

/// HTTP request timeout (seconds)
const HTTP_TIMEOUT_SECS: u64 = 15;
/// HTTP connection timeout (milliseconds)
const HTTP_CONNECT_TIMEOUT_MS: u64 = 3000;
/// Max idle connections per host in connection pool
const HTTP_POOL_MAX_IDLE: usize = 4;
/// How long idle connections stay in the pool (seconds)
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Create the pooled HTTP client used by a REST adapter
pub fn create_http_client(service: &str) -> reqwest::Client {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS))
        .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE)
        .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    tracing::info!(
        phase = "init",
        service = %service,
        timeout_s = HTTP_TIMEOUT_SECS,
        connect_timeout_ms = HTTP_CONNECT_TIMEOUT_MS,
        "HTTP client configured"
    );
    client
}

/// Token symbol used for a chain's native gas currency
pub const NATIVE: &str = "NATIVE";

// =============================================================================
// Chains
// =============================================================================

/// Every chain (or chain-like ledger) the strategy moves funds between
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Perp venue ledger. Collateral lives here as account value.
    Hyperliquid,
    Arbitrum,
    Unichain,
    Base,
}

impl Chain {
    /// EVM chain id, `None` for the perp venue ledger
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Hyperliquid => None,
            Chain::Arbitrum => Some(42161),
            Chain::Unichain => Some(130),
            Chain::Base => Some(8453),
        }
    }

    pub fn is_evm(&self) -> bool {
        self.chain_id().is_some()
    }

    /// Prefix of the `<CHAIN>_RPC_URL` environment variable
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Chain::Hyperliquid => "HYPERLIQUID",
            Chain::Arbitrum => "ARBITRUM",
            Chain::Unichain => "UNICHAIN",
            Chain::Base => "BASE",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Hyperliquid => write!(f, "hyperliquid"),
            Chain::Arbitrum => write!(f, "arbitrum"),
            Chain::Unichain => write!(f, "unichain"),
            Chain::Base => write!(f, "base"),
        }
    }
}

// =============================================================================
// Perp venue
// =============================================================================

/// Open position on the perp venue. `size` is signed, short is negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub asset: String,
    pub size: f64,
    pub entry_price: f64,
    pub liquidation_price: Option<f64>,
}

impl PositionInfo {
    pub fn flat(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
            size: 0.0,
            entry_price: 0.0,
            liquidation_price: None,
        }
    }
}

/// One historical funding observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingSample {
    pub timestamp: DateTime<Utc>,
    pub rate: f64,
}

/// Result of moving the perp position toward a target size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpFill {
    pub asset: String,
    /// Signed size actually traded (negative = sold)
    pub filled_size: f64,
    pub avg_price: Option<f64>,
}

// =============================================================================
// Swaps
// =============================================================================

/// Quote returned by the swap service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub sell_token: String,
    pub buy_token: String,
    pub sell_amount: f64,
    pub amount_out: f64,
    pub price: f64,
    pub pool_address: Option<String>,
    pub protocol: Option<String>,
    pub gas_estimate: Option<u64>,
}

/// Executed swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapFill {
    pub tx_hash: String,
    pub amount_out: f64,
    pub gas_used: Option<u64>,
}

// =============================================================================
// Bridges
// =============================================================================

/// Handle for an in-flight bridge transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId {
    pub provider: String,
    pub id: String,
}

impl TransferId {
    pub fn new(provider: &str, id: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            id: id.into(),
        }
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.id)
    }
}

/// Settlement status of a bridge transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeStatus {
    Pending,
    Settled { amount_received: f64 },
    Failed(String),
}
