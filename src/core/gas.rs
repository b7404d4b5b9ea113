//! Gas sentinel
//!
//! Keeps each wallet's native balance inside a hysteresis band: nothing
//! happens until the balance drops below `min_native`, then it is topped up
//! to `target_native`.
//!
//! On the swap venue's chain the top-up is bought with stable if stable
//! covers the cost, otherwise with the spot asset. Other chains are fed
//! from the surplus of another gas chain: wrap there, bridge the wrapped
//! token, unwrap on arrival. When no chain has enough surplus the missing
//! amount is bought on the swap chain first.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::traits::{NativeWrapper, SwapVenue};
use crate::adapters::types::{Chain, NATIVE};
use crate::core::rebalancer::{chain_actions, ActionKind};
use crate::core::retry::RetryPolicy;
use crate::core::router::{ActionOutcome, CrossChainRouter};
use crate::core::state::StrategyState;

/// Smallest native amount worth a bridge transfer
pub const MIN_NATIVE_TRANSFER: f64 = 0.001;

/// Gas band for one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasTarget {
    pub chain: Chain,
    pub min_native: f64,
    pub target_native: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GasAction {
    Sufficient,
    ToppedUp {
        sold_token: String,
        sold_amount: f64,
        received: f64,
    },
    /// Moved over from another chain's surplus
    Transferred {
        from: Chain,
        sent: f64,
        received: f64,
    },
    /// Below minimum and nothing could be done about it
    Unfunded { shortfall: f64, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasCheck {
    pub chain: Chain,
    pub native_balance: f64,
    pub action: GasAction,
}

/// Amount of native to buy, `None` while at or above `min`
pub fn gas_shortfall(native: f64, min: f64, target: f64) -> Option<f64> {
    if native < min {
        Some((target - native).max(0.0))
    } else {
        None
    }
}

/// Cross-chain path for gas: wrapper plus a router for the bridge hop
pub struct GasTransfer {
    pub router: CrossChainRouter,
    pub wrapper: Arc<dyn NativeWrapper>,
    pub wrapped_token: String,
}

pub struct GasSentinel {
    swap: Arc<dyn SwapVenue>,
    retry: RetryPolicy,
    targets: Vec<GasTarget>,
    /// Symbol the swap venue uses for the native currency
    native_symbol: String,
    stable_token: String,
    spot_token: String,
    max_slippage: f64,
    transfer: Option<GasTransfer>,
}

impl GasSentinel {
    pub fn new(
        swap: Arc<dyn SwapVenue>,
        retry: RetryPolicy,
        targets: Vec<GasTarget>,
        native_symbol: &str,
        stable_token: &str,
        spot_token: &str,
        max_slippage: f64,
    ) -> Self {
        Self {
            swap,
            retry,
            targets,
            native_symbol: native_symbol.to_string(),
            stable_token: stable_token.to_string(),
            spot_token: spot_token.to_string(),
            max_slippage,
            transfer: None,
        }
    }

    /// Allow feeding chains without a swap venue from other chains
    pub fn with_transfer(mut self, transfer: GasTransfer) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn targets(&self) -> &[GasTarget] {
        &self.targets
    }

    /// Check every configured chain against `state`, topping up where possible
    ///
    /// The swap chain is handled first so its fresh balance can feed the
    /// others; checks come back in that order.
    pub async fn ensure_gas(&self, state: &StrategyState) -> Vec<GasCheck> {
        let swap_chain = self.swap.chain();
        let mut natives: HashMap<Chain, f64> = self
            .targets
            .iter()
            .map(|t| (t.chain, state.balance(t.chain, NATIVE)))
            .collect();
        let mut order: Vec<&GasTarget> = self.targets.iter().collect();
        order.sort_by_key(|t| t.chain != swap_chain);

        let mut checks = Vec::with_capacity(order.len());
        for target in order {
            let native = natives.get(&target.chain).copied().unwrap_or(0.0);
            let action = match gas_shortfall(native, target.min_native, target.target_native) {
                None => GasAction::Sufficient,
                Some(shortfall) if target.chain == swap_chain => {
                    let action = self.top_up(state, target.chain, shortfall).await;
                    if let GasAction::ToppedUp { received, .. } = &action {
                        *natives.entry(target.chain).or_insert(0.0) += received;
                    }
                    action
                }
                Some(shortfall) => self.transfer_in(state, target.chain, shortfall, &mut natives).await,
            };
            match &action {
                GasAction::Sufficient => {
                    tracing::debug!(chain = %target.chain, native, "[GAS] Balance sufficient")
                }
                GasAction::ToppedUp { sold_token, sold_amount, received } => tracing::info!(
                    chain = %target.chain,
                    native,
                    sold_token = %sold_token,
                    sold_amount,
                    received,
                    "[GAS] Topped up native balance"
                ),
                GasAction::Transferred { from, sent, received } => tracing::info!(
                    chain = %target.chain,
                    from = %from,
                    native,
                    sent,
                    received,
                    "[GAS] Native balance moved across chains"
                ),
                GasAction::Unfunded { shortfall, reason } => tracing::warn!(
                    chain = %target.chain,
                    native,
                    min = target.min_native,
                    shortfall,
                    reason = %reason,
                    "[GAS] Native balance below minimum"
                ),
            }
            checks.push(GasCheck {
                chain: target.chain,
                native_balance: native,
                action,
            });
        }
        checks
    }

    /// Native above a chain's own target, negative when below it
    fn surplus(&self, natives: &HashMap<Chain, f64>, chain: Chain) -> f64 {
        let keep = self
            .targets
            .iter()
            .find(|t| t.chain == chain)
            .map(|t| t.target_native)
            .unwrap_or(0.0);
        natives.get(&chain).copied().unwrap_or(0.0) - keep
    }

    async fn transfer_in(
        &self,
        state: &StrategyState,
        chain: Chain,
        shortfall: f64,
        natives: &mut HashMap<Chain, f64>,
    ) -> GasAction {
        let unfunded = |reason: String| GasAction::Unfunded { shortfall, reason };
        let Some(transfer) = &self.transfer else {
            return unfunded(format!("no swap venue on {}", chain));
        };

        let best = self
            .targets
            .iter()
            .map(|t| t.chain)
            .filter(|c| *c != chain)
            .map(|c| (c, self.surplus(natives, c)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let swap_chain = self.swap.chain();
        let donor = match best {
            Some((donor, surplus)) if surplus >= shortfall => donor,
            _ if swap_chain != chain => {
                let missing = shortfall - self.surplus(natives, swap_chain);
                match self.top_up(state, swap_chain, missing).await {
                    GasAction::ToppedUp { received, .. } => {
                        *natives.entry(swap_chain).or_insert(0.0) += received;
                        swap_chain
                    }
                    GasAction::Unfunded { reason, .. } => {
                        return unfunded(format!("could not buy gas on {}: {}", swap_chain, reason))
                    }
                    other => return unfunded(format!("unexpected top-up result {:?}", other)),
                }
            }
            _ => return unfunded("no chain with surplus native".to_string()),
        };

        let amount = shortfall.min(self.surplus(natives, donor));
        if amount < MIN_NATIVE_TRANSFER {
            return unfunded(format!("surplus on {} too small to bridge ({})", donor, amount));
        }

        let wrapped = transfer.wrapped_token.as_str();
        if let Err(e) = transfer.wrapper.wrap_native(donor, wrapped, amount).await {
            return unfunded(format!("wrap on {} failed: {}", donor, e));
        }
        *natives.entry(donor).or_insert(0.0) -= amount;

        let actions = chain_actions(vec![ActionKind::BridgeTransfer {
            token: wrapped.to_string(),
            amount,
            source: donor,
            dest: chain,
        }]);
        let report = transfer.router.execute_unpreemptible(&actions).await;
        let received = match report.completed.first().map(|c| &c.outcome) {
            Some(ActionOutcome::Bridged { amount_received, .. }) if report.is_complete() => {
                *amount_received
            }
            _ => {
                tracing::warn!(
                    from = %donor,
                    to = %chain,
                    token = %wrapped,
                    amount,
                    in_flight = ?report.in_flight,
                    "[GAS] Wrapped gas transfer did not complete"
                );
                return unfunded(format!("bridge {} -> {} failed: {:?}", donor, chain, report.outcome));
            }
        };

        if let Err(e) = transfer.wrapper.unwrap_native(chain, wrapped, received).await {
            return unfunded(format!("unwrap on {} failed: {}", chain, e));
        }
        *natives.entry(chain).or_insert(0.0) += received;
        GasAction::Transferred {
            from: donor,
            sent: amount,
            received,
        }
    }

    async fn top_up(&self, state: &StrategyState, chain: Chain, shortfall: f64) -> GasAction {
        let unfunded = |reason: String| GasAction::Unfunded { shortfall, reason };

        if chain != self.swap.chain() {
            return unfunded(format!("no swap venue on {}", chain));
        }
        if let Err(e) = self.retry.run("gas.health", || self.swap.health()).await {
            return unfunded(format!("swap service unhealthy: {}", e));
        }

        // Price the shortfall in stable
        let native = self.native_symbol.as_str();
        let stable = self.stable_token.as_str();
        let cost = match self
            .retry
            .run("gas.price", || self.swap.quote(native, stable, shortfall))
            .await
        {
            Ok(q) => q.amount_out * (1.0 + self.max_slippage),
            Err(e) => return unfunded(format!("could not price gas: {}", e)),
        };

        let mark = state.perp_position.mark_price;
        let stable_held = state.balance(chain, stable);
        let asset_held = state.balance(chain, &self.spot_token);
        let (sell_token, sell_amount) = if stable_held >= cost {
            (stable, cost)
        } else if mark > 0.0 && asset_held >= cost / mark {
            (self.spot_token.as_str(), cost / mark)
        } else {
            return unfunded(format!(
                "not enough {} ({}) or {} ({}) to cover {}",
                stable, stable_held, self.spot_token, asset_held, cost
            ));
        };

        let quote = match self
            .retry
            .run("gas.quote", || self.swap.quote(sell_token, native, sell_amount))
            .await
        {
            Ok(q) => q,
            Err(e) => return unfunded(format!("quote failed: {}", e)),
        };
        let min_out = quote.amount_out * (1.0 - self.max_slippage);
        // Sent once, never retried
        match self.swap.execute_swap(&quote, min_out).await {
            Ok(fill) => GasAction::ToppedUp {
                sold_token: sell_token.to_string(),
                sold_amount: sell_amount,
                received: fill.amount_out,
            },
            Err(e) => unfunded(format!("swap failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_utils::{MockBridge, MockLedger, MockPerpVenue, MockSwapVenue};
    use crate::adapters::traits::BridgeProvider;
    use crate::core::router::RouterConfig;
    use crate::core::state::{ChainBalance, PerpSnapshot};
    use chrono::Utc;
    use std::time::Duration;

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            jitter_ms: 0,
            ..RetryPolicy::default()
        }
    }

    fn swap(ledger: Arc<MockLedger>) -> Arc<MockSwapVenue> {
        Arc::new(
            MockSwapVenue::new(ledger, Chain::Unichain)
                .with_price("USDC", 1.0)
                .with_price("WETH", 2000.0)
                .with_price(NATIVE, 2000.0),
        )
    }

    fn sentinel(ledger: Arc<MockLedger>) -> GasSentinel {
        GasSentinel::new(
            swap(ledger),
            retry(),
            vec![
                GasTarget { chain: Chain::Unichain, min_native: 0.001, target_native: 0.003 },
                GasTarget { chain: Chain::Arbitrum, min_native: 0.001, target_native: 0.002 },
            ],
            NATIVE,
            "USDC",
            "WETH",
            0.01,
        )
    }

    /// Sentinel that can move gas Unichain <-> Arbitrum over a mock Across
    fn bridged_sentinel(ledger: Arc<MockLedger>) -> GasSentinel {
        let across: Arc<dyn BridgeProvider> = Arc::new(MockBridge::new(
            ledger.clone(),
            "across",
            vec![(Chain::Unichain, Chain::Arbitrum)],
        ));
        let router = CrossChainRouter::new(
            Arc::new(MockPerpVenue::new(ledger.clone(), 2000.0)),
            swap(ledger.clone()),
            vec![across],
            ledger.clone(),
            retry(),
            RouterConfig {
                transit_chain: Chain::Arbitrum,
                poll_interval: Duration::from_millis(5),
                settlement_timeout: Duration::from_millis(200),
                max_slippage: 0.01,
                perp_max_slippage: 0.01,
            },
        );
        sentinel(ledger.clone()).with_transfer(GasTransfer {
            router,
            wrapper: ledger,
            wrapped_token: "WETH".to_string(),
        })
    }

    fn state(ledger: &MockLedger) -> StrategyState {
        let balances = [
            (Chain::Unichain, NATIVE),
            (Chain::Unichain, "USDC"),
            (Chain::Unichain, "WETH"),
            (Chain::Arbitrum, NATIVE),
        ]
        .iter()
        .map(|(chain, token)| ChainBalance {
            chain: *chain,
            token: token.to_string(),
            amount: ledger.get(*chain, token),
        })
        .collect();
        StrategyState::new(
            Utc::now(),
            "ETH",
            PerpSnapshot::new(-1.0, 2000.0, 2000.0, None, 700.0),
            balances,
            None,
        )
    }

    #[test]
    fn test_shortfall_hysteresis() {
        assert_eq!(gas_shortfall(0.002, 0.001, 0.003), None);
        assert_eq!(gas_shortfall(0.001, 0.001, 0.003), None);
        let s = gas_shortfall(0.0005, 0.001, 0.003).unwrap();
        assert!((s - 0.0025).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_sufficient_balances_do_nothing() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.01);
        ledger.set(Chain::Arbitrum, NATIVE, 0.01);
        let checks = sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        assert!(checks.iter().all(|c| c.action == GasAction::Sufficient));
        assert_eq!(ledger.call_count("quote"), 0);
    }

    #[tokio::test]
    async fn test_tops_up_with_stable_first() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.0005);
        ledger.set(Chain::Unichain, "USDC", 100.0);
        ledger.set(Chain::Unichain, "WETH", 1.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.01);

        let checks = sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        match &checks[0].action {
            GasAction::ToppedUp { sold_token, received, .. } => {
                assert_eq!(sold_token, "USDC");
                assert!(*received >= 0.0025);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ledger.get(Chain::Unichain, NATIVE) >= 0.003);
        assert_eq!(ledger.get(Chain::Unichain, "WETH"), 1.0);
        assert_eq!(ledger.call_count("execute_swap"), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_asset() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.0);
        ledger.set(Chain::Unichain, "USDC", 1.0);
        ledger.set(Chain::Unichain, "WETH", 1.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.01);

        let checks = sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        match &checks[0].action {
            GasAction::ToppedUp { sold_token, .. } => assert_eq!(sold_token, "WETH"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ledger.get(Chain::Unichain, "WETH") < 1.0);
    }

    #[tokio::test]
    async fn test_unhealthy_swap_service_skips_top_up() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.0005);
        ledger.set(Chain::Unichain, "USDC", 100.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.01);
        ledger.fail("health");

        let checks = sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        match &checks[0].action {
            GasAction::Unfunded { reason, .. } => assert!(reason.contains("unhealthy"), "{}", reason),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.call_count("health"), 1);
        assert_eq!(ledger.call_count("quote"), 0);
        assert_eq!(ledger.call_count("execute_swap"), 0);
    }

    #[tokio::test]
    async fn test_failed_gas_swap_is_not_resent() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.0005);
        ledger.set(Chain::Unichain, "USDC", 100.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.01);
        ledger.fail("execute_swap");

        let sentinel = GasSentinel {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                jitter_ms: 0,
                call_timeout_ms: 500,
            },
            ..sentinel(ledger.clone())
        };
        let checks = sentinel.ensure_gas(&state(&ledger)).await;
        assert!(matches!(checks[0].action, GasAction::Unfunded { .. }));
        assert_eq!(ledger.call_count("execute_swap"), 1);
    }

    #[tokio::test]
    async fn test_chain_without_transfer_path_is_reported() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.01);
        ledger.set(Chain::Arbitrum, NATIVE, 0.0);

        let checks = sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        assert_eq!(checks[1].chain, Chain::Arbitrum);
        assert!(matches!(checks[1].action, GasAction::Unfunded { .. }));
    }

    #[tokio::test]
    async fn test_moves_surplus_to_chain_without_swap_venue() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.01);
        ledger.set(Chain::Unichain, "WETH", 1.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.0);

        let checks = bridged_sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        assert_eq!(checks[0].action, GasAction::Sufficient);
        match &checks[1].action {
            GasAction::Transferred { from, sent, received } => {
                assert_eq!(*from, Chain::Unichain);
                assert!((sent - 0.002).abs() < 1e-12);
                assert!((received - 0.002).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!((ledger.get(Chain::Arbitrum, NATIVE) - 0.002).abs() < 1e-12);
        assert!((ledger.get(Chain::Unichain, NATIVE) - 0.008).abs() < 1e-12);
        // Wrapped only in transit; spot holding untouched
        assert_eq!(ledger.get(Chain::Unichain, "WETH"), 1.0);
        assert_eq!(ledger.get(Chain::Arbitrum, "WETH"), 0.0);
        assert_eq!(ledger.call_count("wrap"), 1);
        assert_eq!(ledger.call_count("bridge"), 1);
        assert_eq!(ledger.call_count("unwrap"), 1);
    }

    #[tokio::test]
    async fn test_buys_on_swap_chain_when_no_surplus_then_moves() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.002);
        ledger.set(Chain::Unichain, "USDC", 100.0);
        ledger.set(Chain::Arbitrum, NATIVE, 0.0);

        let checks = bridged_sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        assert_eq!(checks[0].action, GasAction::Sufficient);
        match &checks[1].action {
            GasAction::Transferred { from, sent, .. } => {
                assert_eq!(*from, Chain::Unichain);
                assert!((sent - 0.002).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.call_count("execute_swap"), 1);
        assert!(ledger.get(Chain::Unichain, "USDC") < 100.0);
        assert!((ledger.get(Chain::Arbitrum, NATIVE) - 0.002).abs() < 1e-12);
        // Swap chain keeps its own target
        assert!(ledger.get(Chain::Unichain, NATIVE) >= 0.003 - 1e-12);
    }

    #[tokio::test]
    async fn test_failed_bridge_leaves_recipient_unfunded() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, NATIVE, 0.01);
        ledger.set(Chain::Arbitrum, NATIVE, 0.0);
        ledger.fail("bridge");

        let checks = bridged_sentinel(ledger.clone()).ensure_gas(&state(&ledger)).await;
        assert!(matches!(checks[1].action, GasAction::Unfunded { .. }));
        assert_eq!(ledger.call_count("bridge"), 1);
        assert_eq!(ledger.call_count("unwrap"), 0);
        assert_eq!(ledger.get(Chain::Arbitrum, NATIVE), 0.0);
    }
}
