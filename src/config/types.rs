//! Configuration types for the strategy
//!
//! This module defines all configuration structs that are loaded from YAML.
//! Secrets and endpoints come from the environment (see `credentials`).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::types::{Chain, NATIVE};
use crate::core::gas::GasTarget;
use crate::core::rebalancer::RebalanceParams;
use crate::core::retry::RetryPolicy;
use crate::core::router::RouterConfig;
use crate::error::AppError;

// ============================================================================
// Defaults
// ============================================================================

fn default_asset() -> String {
    "ETH".to_string()
}
fn default_leverage() -> f64 {
    3.0
}
fn default_buffer() -> f64 {
    0.5
}
fn default_min_action_usd() -> f64 {
    10.0
}
fn default_fast_interval_secs() -> u64 {
    60
}
fn default_slow_interval_secs() -> u64 {
    600
}
fn default_lookback_hours() -> u64 {
    168
}
fn default_sampling_minutes() -> u64 {
    60
}
fn default_max_slippage() -> f64 {
    0.005
}
fn default_perp_max_slippage() -> f64 {
    0.01
}
fn default_poll_interval_secs() -> u64 {
    15
}
fn default_settlement_timeout_secs() -> u64 {
    1800
}
fn default_state_path() -> PathBuf {
    PathBuf::from("strategy_state.jsonl")
}
fn default_flag_path() -> PathBuf {
    PathBuf::from("UNWIND")
}
fn default_flag_poll_secs() -> u64 {
    5
}
fn default_stranded_threshold() -> f64 {
    1.0
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Leverage, thresholds and timers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Perp asset (e.g., "ETH")
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_leverage")]
    pub target_leverage: f64,
    /// Allowed drift around the target before rebalancing
    #[serde(default = "default_buffer")]
    pub buffer: f64,
    /// Transfers and swaps below this USD value are skipped
    #[serde(default = "default_min_action_usd")]
    pub min_action_usd: f64,
    /// Observe tick period
    #[serde(default = "default_fast_interval_secs")]
    pub fast_interval_secs: u64,
    /// Rebalance tick period
    #[serde(default = "default_slow_interval_secs")]
    pub slow_interval_secs: u64,
    #[serde(default = "default_lookback_hours")]
    pub funding_lookback_hours: u64,
    #[serde(default = "default_sampling_minutes")]
    pub funding_sampling_minutes: u64,
    /// Swap slippage tolerance (fraction)
    #[serde(default = "default_max_slippage")]
    pub max_slippage: f64,
    /// Perp order slippage tolerance (fraction)
    #[serde(default = "default_perp_max_slippage")]
    pub perp_max_slippage: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            target_leverage: default_leverage(),
            buffer: default_buffer(),
            min_action_usd: default_min_action_usd(),
            fast_interval_secs: default_fast_interval_secs(),
            slow_interval_secs: default_slow_interval_secs(),
            funding_lookback_hours: default_lookback_hours(),
            funding_sampling_minutes: default_sampling_minutes(),
            max_slippage: default_max_slippage(),
            perp_max_slippage: default_perp_max_slippage(),
        }
    }
}

/// Which chain plays which role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    pub perp: Chain,
    pub spot: Chain,
    /// Intermediate chain for routes no single bridge covers
    pub transit: Chain,
    /// Where everything is consolidated on unwind
    pub withdrawal: Chain,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            perp: Chain::Hyperliquid,
            spot: Chain::Unichain,
            transit: Chain::Arbitrum,
            withdrawal: Chain::Arbitrum,
        }
    }
}

/// Token symbols and per-chain ERC20 addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    pub stable: String,
    /// Spot asset token on the spot chain (e.g., WETH)
    pub spot: String,
    /// Symbol the swap service uses for the native currency
    pub native_symbol: String,
    /// Wrapped native token carried across bridges for gas
    #[serde(default = "default_wrapped_native")]
    pub wrapped_native: String,
    #[serde(default)]
    pub addresses: BTreeMap<Chain, BTreeMap<String, String>>,
}

fn default_wrapped_native() -> String {
    "WETH".to_string()
}

impl TokensConfig {
    pub fn address(&self, chain: Chain, token: &str) -> Option<&str> {
        self.addresses
            .get(&chain)
            .and_then(|t| t.get(token))
            .map(|s| s.as_str())
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            stable: "USDC".to_string(),
            spot: "WETH".to_string(),
            native_symbol: "ETH".to_string(),
            wrapped_native: default_wrapped_native(),
            addresses: BTreeMap::new(),
        }
    }
}

/// Bridge polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_settlement_timeout_secs")]
    pub settlement_timeout_secs: u64,
    /// Transit-chain stable above this is reported as stranded
    #[serde(default = "default_stranded_threshold")]
    pub stranded_threshold: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            settlement_timeout_secs: default_settlement_timeout_secs(),
            stranded_threshold: default_stranded_threshold(),
        }
    }
}

/// State log backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Jsonl,
    Memory,
    Supabase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Jsonl,
            path: default_state_path(),
        }
    }
}

/// Unwind flag file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_flag_path")]
    pub unwind_flag_path: PathBuf,
    #[serde(default = "default_flag_poll_secs")]
    pub poll_secs: u64,
}

impl ControlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            unwind_flag_path: default_flag_path(),
            poll_secs: default_flag_poll_secs(),
        }
    }
}

/// Perp venue settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperliquidConfig {
    #[serde(default)]
    pub testnet: bool,
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub gas: Vec<GasTarget>,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub hyperliquid: HyperliquidConfig,
}

impl AppConfig {
    /// Validate all configuration rules
    pub fn validate(&self) -> Result<(), AppError> {
        let s = &self.strategy;

        if s.asset.trim().is_empty() {
            return Err(AppError::Config("strategy.asset cannot be empty".to_string()));
        }
        if !(s.target_leverage > 0.0 && s.target_leverage.is_finite()) {
            return Err(AppError::Config(format!(
                "strategy.target_leverage must be > 0 (got {})",
                s.target_leverage
            )));
        }
        if s.buffer < 0.0 || s.buffer >= s.target_leverage {
            return Err(AppError::Config(format!(
                "strategy.buffer must be >= 0 and < target_leverage (got {})",
                s.buffer
            )));
        }
        if s.min_action_usd < 0.0 {
            return Err(AppError::Config(format!(
                "strategy.min_action_usd must be >= 0 (got {})",
                s.min_action_usd
            )));
        }
        for (name, value) in [
            ("max_slippage", s.max_slippage),
            ("perp_max_slippage", s.perp_max_slippage),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(AppError::Config(format!(
                    "strategy.{} must be between 0 and 1 (got {})",
                    name, value
                )));
            }
        }
        if s.fast_interval_secs == 0 || s.fast_interval_secs > s.slow_interval_secs {
            return Err(AppError::Config(format!(
                "strategy.fast_interval_secs ({}) must be > 0 and <= slow_interval_secs ({})",
                s.fast_interval_secs, s.slow_interval_secs
            )));
        }
        if s.funding_sampling_minutes == 0
            || s.funding_lookback_hours * 60 < 2 * s.funding_sampling_minutes
        {
            return Err(AppError::Config(
                "funding lookback must cover at least two sampling intervals".to_string(),
            ));
        }

        let c = &self.chains;
        if c.perp == c.spot {
            return Err(AppError::Config(format!(
                "chains.perp and chains.spot cannot be the same (both are {})",
                c.perp
            )));
        }
        for (name, chain) in [("spot", c.spot), ("transit", c.transit), ("withdrawal", c.withdrawal)] {
            if !chain.is_evm() {
                return Err(AppError::Config(format!(
                    "chains.{} must be an EVM chain (got {})",
                    name, chain
                )));
            }
        }

        for token in [&self.tokens.stable, &self.tokens.spot] {
            if self.tokens.address(c.spot, token).is_none() {
                return Err(AppError::Config(format!(
                    "tokens.addresses.{} is missing {}",
                    c.spot, token
                )));
            }
        }

        for g in &self.gas {
            if g.min_native < 0.0 || g.target_native <= g.min_native {
                return Err(AppError::Config(format!(
                    "gas for {}: target_native ({}) must be > min_native ({}) >= 0",
                    g.chain, g.target_native, g.min_native
                )));
            }
            if !g.chain.is_evm() {
                return Err(AppError::Config(format!("gas: {} has no native balance", g.chain)));
            }
            // Gas reaches chains without a swap venue as the wrapped token
            if g.chain != c.spot && self.tokens.address(g.chain, &self.tokens.wrapped_native).is_none() {
                return Err(AppError::Config(format!(
                    "tokens.addresses.{} is missing {} needed to move gas there",
                    g.chain, self.tokens.wrapped_native
                )));
            }
        }

        if self.retry.max_attempts < 1 || self.retry.call_timeout_ms == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be >= 1 and retry.call_timeout_ms > 0".to_string(),
            ));
        }
        if self.bridge.poll_interval_secs == 0 {
            return Err(AppError::Config("bridge.poll_interval_secs must be > 0".to_string()));
        }
        if self.store.backend == StoreBackend::Jsonl && self.store.path.as_os_str().is_empty() {
            return Err(AppError::Config("store.path cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.strategy.fast_interval_secs)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.strategy.slow_interval_secs)
    }

    pub fn funding_lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.strategy.funding_lookback_hours as i64)
    }

    pub fn funding_sampling(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.strategy.funding_sampling_minutes as i64)
    }

    /// EVM chains the wallet needs an RPC endpoint for
    pub fn evm_chains(&self) -> Vec<Chain> {
        let mut chains = vec![self.chains.spot, self.chains.transit, self.chains.withdrawal];
        chains.extend(self.gas.iter().map(|g| g.chain));
        chains.retain(|c| c.is_evm());
        chains.sort();
        chains.dedup();
        chains
    }

    /// Every (chain, token) pair captured in a snapshot
    pub fn tracked_balances(&self) -> Vec<(Chain, String)> {
        let c = &self.chains;
        let t = &self.tokens;
        let mut pairs = vec![(c.spot, t.stable.clone()), (c.spot, t.spot.clone())];
        for chain in [c.transit, c.withdrawal] {
            if chain.is_evm() {
                pairs.push((chain, t.stable.clone()));
            }
        }
        pairs.extend(self.gas.iter().map(|g| (g.chain, NATIVE.to_string())));
        pairs.sort();
        pairs.dedup();
        pairs
    }

    pub fn rebalance_params(&self) -> RebalanceParams {
        RebalanceParams {
            target_leverage: self.strategy.target_leverage,
            buffer: self.strategy.buffer,
            min_action_usd: self.strategy.min_action_usd,
            perp_chain: self.chains.perp,
            spot_chain: self.chains.spot,
            asset: self.strategy.asset.clone(),
            stable_token: self.tokens.stable.clone(),
            spot_token: self.tokens.spot.clone(),
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            transit_chain: self.chains.transit,
            poll_interval: Duration::from_secs(self.bridge.poll_interval_secs),
            settlement_timeout: Duration::from_secs(self.bridge.settlement_timeout_secs),
            max_slippage: self.strategy.max_slippage,
            perp_max_slippage: self.strategy.perp_max_slippage,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        let mut unichain = BTreeMap::new();
        unichain.insert("USDC".to_string(), "0x078D782b760474a361dDA0AF3839290b0EF57AD6".to_string());
        unichain.insert("WETH".to_string(), "0x4200000000000000000000000000000000000006".to_string());
        config.tokens.addresses.insert(Chain::Unichain, unichain);
        config.gas.push(GasTarget {
            chain: Chain::Unichain,
            min_native: 0.001,
            target_native: 0.003,
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_defaults_mirror_strategy() {
        let config = AppConfig::default();
        assert_eq!(config.strategy.asset, "ETH");
        assert_eq!(config.strategy.target_leverage, 3.0);
        assert_eq!(config.strategy.buffer, 0.5);
        assert_eq!(config.strategy.slow_interval_secs, 600);
        assert_eq!(config.funding_lookback(), chrono::Duration::days(7));
        assert_eq!(config.store.path, PathBuf::from("strategy_state.jsonl"));
    }

    #[test]
    fn test_leverage_must_be_positive() {
        let mut config = valid_config();
        config.strategy.target_leverage = 0.0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("target_leverage must be > 0"));
    }

    #[test]
    fn test_buffer_must_be_below_leverage() {
        let mut config = valid_config();
        config.strategy.buffer = 3.0;
        assert!(config.validate().unwrap_err().to_string().contains("buffer"));
    }

    #[test]
    fn test_same_perp_and_spot_chain_fails() {
        let mut config = valid_config();
        config.chains.perp = Chain::Unichain;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("cannot be the same"));
    }

    #[test]
    fn test_fast_interval_longer_than_slow_fails() {
        let mut config = valid_config();
        config.strategy.fast_interval_secs = 900;
        assert!(config.validate().unwrap_err().to_string().contains("fast_interval_secs"));
    }

    #[test]
    fn test_gas_chain_off_spot_needs_wrapped_native() {
        let mut config = valid_config();
        config.gas.push(GasTarget {
            chain: Chain::Arbitrum,
            min_native: 0.0005,
            target_native: 0.002,
        });
        assert!(config.validate().is_err());

        let mut arbitrum = BTreeMap::new();
        arbitrum.insert("WETH".to_string(), "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1".to_string());
        config.tokens.addresses.insert(Chain::Arbitrum, arbitrum);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gas_target_must_exceed_min() {
        let mut config = valid_config();
        config.gas[0].target_native = 0.001;
        assert!(config.validate().unwrap_err().to_string().contains("target_native"));
    }

    #[test]
    fn test_missing_spot_token_address_fails() {
        let mut config = valid_config();
        config.tokens.addresses.clear();
        assert!(config.validate().unwrap_err().to_string().contains("tokens.addresses.unichain"));
    }

    #[test]
    fn test_tracked_balances() {
        let config = valid_config();
        let tracked = config.tracked_balances();
        assert!(tracked.contains(&(Chain::Unichain, "USDC".to_string())));
        assert!(tracked.contains(&(Chain::Unichain, "WETH".to_string())));
        assert!(tracked.contains(&(Chain::Arbitrum, "USDC".to_string())));
        assert!(tracked.contains(&(Chain::Unichain, NATIVE.to_string())));
        assert_eq!(tracked.len(), 4);
    }

    #[test]
    fn test_evm_chains() {
        assert_eq!(valid_config().evm_chains(), vec![Chain::Arbitrum, Chain::Unichain]);
    }

    #[test]
    fn test_store_backend_serde() {
        let backend: StoreBackend = serde_yaml::from_str("supabase").unwrap();
        assert_eq!(backend, StoreBackend::Supabase);
    }
}
