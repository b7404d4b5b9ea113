//! Adapter trait definitions
//!
//! The strategy core only talks to the outside world through these
//! traits. Production implementations live next to this file; tests use
//! the in-process mocks from `test_utils`.

use async_trait::async_trait;
use chrono::Duration;

use crate::adapters::errors::VenueResult;
use crate::adapters::types::{
    BridgeStatus, Chain, FundingSample, PerpFill, PositionInfo, SwapFill, SwapQuote, TransferId,
};

/// Perpetual futures venue holding the short leg
#[async_trait]
pub trait PerpVenue: Send + Sync {
    /// Venue name for logging
    fn venue_name(&self) -> &'static str;

    /// Total account value (collateral plus unrealized PnL), in USD
    async fn account_value(&self) -> VenueResult<f64>;

    /// Current position for `asset`; a flat position has size 0
    async fn position(&self, asset: &str) -> VenueResult<PositionInfo>;

    async fn mark_price(&self, asset: &str) -> VenueResult<f64>;

    /// Current (predicted) funding rate per period
    async fn funding_rate(&self, asset: &str) -> VenueResult<f64>;

    /// Funding samples covering the last `window`
    async fn funding_history(&self, asset: &str, window: Duration)
        -> VenueResult<Vec<FundingSample>>;

    /// Trade until the signed position size equals `target_size`
    ///
    /// Execution price may not be worse than mark by more than `max_slippage`.
    async fn adjust_position(
        &self,
        asset: &str,
        target_size: f64,
        max_slippage: f64,
    ) -> VenueResult<PerpFill>;
}

/// Spot swap venue on a single chain
#[async_trait]
pub trait SwapVenue: Send + Sync {
    /// Chain the swaps settle on
    fn chain(&self) -> Chain;

    async fn health(&self) -> VenueResult<()>;

    async fn quote(&self, sell_token: &str, buy_token: &str, sell_amount: f64)
        -> VenueResult<SwapQuote>;

    /// Execute a previously quoted swap, reverting if less than `min_amount_out` comes back
    async fn execute_swap(&self, quote: &SwapQuote, min_amount_out: f64) -> VenueResult<SwapFill>;
}

/// One cross-chain transfer protocol
#[async_trait]
pub trait BridgeProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Whether this provider can move funds directly from `source` to `dest`
    fn supports(&self, source: Chain, dest: Chain) -> bool;

    async fn bridge(
        &self,
        token: &str,
        amount: f64,
        source: Chain,
        dest: Chain,
    ) -> VenueResult<TransferId>;

    async fn status(&self, transfer: &TransferId) -> VenueResult<BridgeStatus>;
}

/// Wallet balances on every configured chain
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Balance of `token` (or `types::NATIVE`) held by the strategy wallet on `chain`
    async fn balance(&self, chain: Chain, token: &str) -> VenueResult<f64>;
}

/// WETH-style wrapping of the native currency, so gas can ride a token bridge
#[async_trait]
pub trait NativeWrapper: Send + Sync {
    /// Native currency into `wrapped_token`
    async fn wrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()>;

    /// `wrapped_token` back into the native currency
    async fn unwrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()>;
}
