//! Strategy state snapshot
//!
//! `StrategyState` is produced by the aggregator once per observe tick from a
//! single synchronized round of queries. It is never mutated afterwards; the
//! rebalancer and gas sentinel read it, the store persists it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::types::Chain;

/// Perp venue side of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerpSnapshot {
    /// Signed position size, short is negative
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    /// `|size| × mark / account_value`; `None` when account value is not positive
    pub leverage: Option<f64>,
    pub liquidation_price: Option<f64>,
    pub account_value: f64,
}

impl PerpSnapshot {
    pub fn new(
        size: f64,
        entry_price: f64,
        mark_price: f64,
        liquidation_price: Option<f64>,
        account_value: f64,
    ) -> Self {
        Self {
            size,
            entry_price,
            mark_price,
            leverage: compute_leverage(size, mark_price, account_value),
            liquidation_price,
            account_value,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0
    }

    pub fn notional(&self) -> f64 {
        self.size.abs() * self.mark_price
    }
}

/// Current leverage, undefined when there is no positive collateral
pub fn compute_leverage(size: f64, mark_price: f64, account_value: f64) -> Option<f64> {
    if account_value > 0.0 {
        Some(size.abs() * mark_price / account_value)
    } else {
        None
    }
}

/// One (chain, token) balance entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainBalance {
    pub chain: Chain,
    pub token: String,
    pub amount: f64,
}

/// Complete view of the strategy at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub perp_position: PerpSnapshot,
    /// Sorted by (chain, token) so serialization is deterministic
    pub chain_balances: Vec<ChainBalance>,
    pub funding_snapshot: Option<f64>,
}

impl StrategyState {
    pub fn new(
        timestamp: DateTime<Utc>,
        asset: &str,
        perp_position: PerpSnapshot,
        mut chain_balances: Vec<ChainBalance>,
        funding_snapshot: Option<f64>,
    ) -> Self {
        chain_balances.sort_by(|a, b| (a.chain, &a.token).cmp(&(b.chain, &b.token)));
        chain_balances.dedup_by(|a, b| a.chain == b.chain && a.token == b.token);
        Self {
            timestamp,
            asset: asset.to_string(),
            perp_position,
            chain_balances,
            funding_snapshot,
        }
    }

    /// Balance of `token` on `chain`; pairs that were not queried read as zero
    pub fn balance(&self, chain: Chain, token: &str) -> f64 {
        self.chain_balances
            .iter()
            .find(|b| b.chain == chain && b.token == token)
            .map(|b| b.amount)
            .unwrap_or(0.0)
    }

    pub fn leverage(&self) -> Option<f64> {
        self.perp_position.leverage
    }

    /// Total portfolio value `T = x + y + z·p`
    pub fn total_value(&self, spot_chain: Chain, stable: &str, spot_asset: &str) -> f64 {
        self.perp_position.account_value
            + self.balance(spot_chain, stable)
            + self.balance(spot_chain, spot_asset) * self.perp_position.mark_price
    }
}
