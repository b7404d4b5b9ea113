//! Cross-chain plan execution
//!
//! Actions run strictly in sequence. Reads and status polls are wrapped in
//! the retry policy. Fund-moving submits (bridge transfers, swaps) are sent
//! exactly once and never timed out from outside: a dropped future may
//! already be on the wire. Once an action gives up, later actions are never
//! attempted. A bridge transfer becomes one or two hops (two when no
//! provider connects the endpoints directly and funds must pass through
//! the transit chain); each hop is polled until it settles and the
//! received amount feeds the next hop.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::{BalanceSource, BridgeProvider, PerpVenue, SwapVenue};
use crate::adapters::types::{BridgeStatus, Chain, PerpFill, SwapFill, TransferId};
use crate::core::control::UnwindSwitch;
use crate::core::rebalancer::{Action, ActionKind, HedgeLeg};
use crate::core::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Chain used between two endpoints no single provider connects
    pub transit_chain: Chain,
    pub poll_interval: Duration,
    pub settlement_timeout: Duration,
    /// Swap slippage tolerance
    pub max_slippage: f64,
    /// Perp order slippage tolerance
    pub perp_max_slippage: f64,
}

/// What a completed action did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionOutcome {
    Bridged {
        transfers: Vec<TransferId>,
        amount_sent: f64,
        amount_received: f64,
    },
    Swapped(SwapFill),
    PerpAdjusted(PerpFill),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedAction {
    pub step: usize,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Completed,
    Failed { step: usize, error: String },
    /// Stopped at an action boundary because an unwind was requested
    Preempted { next_step: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub completed: Vec<CompletedAction>,
    pub outcome: ExecutionOutcome,
    /// Transfers submitted but not seen to settle
    #[serde(default)]
    pub in_flight: Vec<TransferId>,
}

impl ExecutionReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }
}

/// One bridge leg
struct Hop {
    provider: Arc<dyn BridgeProvider>,
    source: Chain,
    dest: Chain,
}

#[derive(Clone)]
pub struct CrossChainRouter {
    perp: Arc<dyn PerpVenue>,
    swap: Arc<dyn SwapVenue>,
    bridges: Vec<Arc<dyn BridgeProvider>>,
    balances: Arc<dyn BalanceSource>,
    retry: RetryPolicy,
    config: RouterConfig,
    unwind: Option<UnwindSwitch>,
}

impl CrossChainRouter {
    pub fn new(
        perp: Arc<dyn PerpVenue>,
        swap: Arc<dyn SwapVenue>,
        bridges: Vec<Arc<dyn BridgeProvider>>,
        balances: Arc<dyn BalanceSource>,
        retry: RetryPolicy,
        config: RouterConfig,
    ) -> Self {
        Self {
            perp,
            swap,
            bridges,
            balances,
            retry,
            config,
            unwind: None,
        }
    }

    /// Stop at the next action boundary once `switch` is raised
    pub fn with_unwind_switch(mut self, switch: UnwindSwitch) -> Self {
        self.unwind = Some(switch);
        self
    }

    /// Execute `actions` in order, honouring the unwind switch
    pub async fn execute(&self, actions: &[Action]) -> ExecutionReport {
        self.run(actions, true).await
    }

    /// Execute `actions` in order, ignoring the unwind switch (used by the unwind itself)
    pub async fn execute_unpreemptible(&self, actions: &[Action]) -> ExecutionReport {
        self.run(actions, false).await
    }

    async fn run(&self, actions: &[Action], preemptible: bool) -> ExecutionReport {
        let mut completed = Vec::with_capacity(actions.len());
        let mut in_flight = Vec::new();

        for action in actions {
            if preemptible && self.unwind.as_ref().map(|s| s.is_requested()).unwrap_or(false) {
                tracing::warn!(next_step = action.step, "[ROUTER] Unwind requested, stopping at action boundary");
                return ExecutionReport {
                    completed,
                    outcome: ExecutionOutcome::Preempted { next_step: action.step },
                    in_flight,
                };
            }

            tracing::info!(step = action.step, action = action.kind.label(), "[ROUTER] Executing action");
            let started = Instant::now();
            match self.execute_action(&action.kind, &mut in_flight).await {
                Ok(outcome) => {
                    tracing::info!(
                        step = action.step,
                        action = action.kind.label(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        outcome = ?outcome,
                        "[ROUTER] Action completed"
                    );
                    completed.push(CompletedAction {
                        step: action.step,
                        outcome,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        step = action.step,
                        action = action.kind.label(),
                        completed = completed.len(),
                        in_flight = ?in_flight,
                        error = %e,
                        "[ROUTER] Action failed, aborting plan"
                    );
                    let error = if in_flight.is_empty() {
                        e.to_string()
                    } else {
                        let ids: Vec<String> = in_flight.iter().map(|t| t.to_string()).collect();
                        format!("{} (in flight: {})", e, ids.join(", "))
                    };
                    return ExecutionReport {
                        completed,
                        outcome: ExecutionOutcome::Failed {
                            step: action.step,
                            error,
                        },
                        in_flight,
                    };
                }
            }
        }

        ExecutionReport {
            completed,
            outcome: ExecutionOutcome::Completed,
            in_flight,
        }
    }

    async fn execute_action(
        &self,
        kind: &ActionKind,
        in_flight: &mut Vec<TransferId>,
    ) -> VenueResult<ActionOutcome> {
        match kind {
            ActionKind::BridgeTransfer {
                token,
                amount,
                source,
                dest,
            } => self.bridge(token, *amount, *source, *dest, in_flight).await,
            ActionKind::Swap {
                chain,
                sell_token,
                buy_token,
                sell_amount,
            } => self
                .swap(*chain, sell_token, buy_token, *sell_amount)
                .await
                .map(ActionOutcome::Swapped),
            ActionKind::PerpAdjust {
                asset,
                target_size,
                hedge,
            } => {
                let target = match hedge {
                    Some(leg) => self.hedge_size(leg, *target_size).await?,
                    None => *target_size,
                };
                let slippage = self.config.perp_max_slippage;
                // Target-sized: a repeat after a lost response trades only the remainder
                self.retry
                    .run("perp.adjust_position", || {
                        self.perp.adjust_position(asset, target, slippage)
                    })
                    .await
                    .map(ActionOutcome::PerpAdjusted)
            }
        }
    }

    /// Short size matching the spot holding the earlier actions left behind
    async fn hedge_size(&self, leg: &HedgeLeg, planned: f64) -> VenueResult<f64> {
        let label = format!("{}.{}", leg.chain, leg.token);
        let held = self
            .retry
            .run(&label, || self.balances.balance(leg.chain, &leg.token))
            .await?;
        let target = -held;
        if (target - planned).abs() > 1e-12 {
            tracing::info!(
                chain = %leg.chain,
                token = %leg.token,
                planned,
                target,
                "[ROUTER] Perp target re-derived from realized spot holding"
            );
        }
        Ok(target)
    }

    /// Direct provider if one exists, else two hops via the transit chain
    fn route(&self, source: Chain, dest: Chain) -> VenueResult<Vec<Hop>> {
        let find = |from: Chain, to: Chain| {
            self.bridges
                .iter()
                .find(|b| b.supports(from, to))
                .cloned()
                .map(|provider| Hop {
                    provider,
                    source: from,
                    dest: to,
                })
        };

        if let Some(hop) = find(source, dest) {
            return Ok(vec![hop]);
        }
        let transit = self.config.transit_chain;
        if transit != source && transit != dest {
            if let (Some(first), Some(second)) = (find(source, transit), find(transit, dest)) {
                return Ok(vec![first, second]);
            }
        }
        Err(VenueError::Unsupported(format!(
            "no bridge route {} -> {}",
            source, dest
        )))
    }

    /// Cap an outgoing amount at what the wallet holds on an EVM chain
    async fn available(&self, chain: Chain, token: &str, wanted: f64) -> VenueResult<f64> {
        if !chain.is_evm() {
            return Ok(wanted);
        }
        let label = format!("{}.{}", chain, token);
        let held = self
            .retry
            .run(&label, || self.balances.balance(chain, token))
            .await?;
        if held < wanted {
            tracing::info!(chain = %chain, token = %token, wanted, held, "[ROUTER] Clamping amount to balance");
        }
        Ok(wanted.min(held))
    }

    async fn bridge(
        &self,
        token: &str,
        amount: f64,
        source: Chain,
        dest: Chain,
        in_flight: &mut Vec<TransferId>,
    ) -> VenueResult<ActionOutcome> {
        let hops = self.route(source, dest)?;
        let amount_sent = self.available(source, token, amount).await?;
        if amount_sent <= 0.0 {
            return Err(VenueError::Rejected(format!(
                "nothing to bridge: no {} on {}",
                token, source
            )));
        }

        let mut amount_in_hop = amount_sent;
        let mut transfers = Vec::with_capacity(hops.len());
        for hop in &hops {
            let provider = &hop.provider;
            tracing::info!(
                provider = provider.provider_name(),
                source = %hop.source,
                dest = %hop.dest,
                token = %token,
                amount = amount_in_hop,
                "[ROUTER] Submitting bridge hop"
            );
            // Sent once, never retried
            let transfer = provider
                .bridge(token, amount_in_hop, hop.source, hop.dest)
                .await?;
            in_flight.push(transfer.clone());
            amount_in_hop = self.await_settlement(provider.as_ref(), &transfer).await?;
            in_flight.retain(|t| t != &transfer);
            transfers.push(transfer);
        }

        Ok(ActionOutcome::Bridged {
            transfers,
            amount_sent,
            amount_received: amount_in_hop,
        })
    }

    /// Poll until settled, failed, or the settlement timeout elapses
    async fn await_settlement(
        &self,
        provider: &dyn BridgeProvider,
        transfer: &TransferId,
    ) -> VenueResult<f64> {
        let deadline = Instant::now() + self.config.settlement_timeout;
        loop {
            let status = self
                .retry
                .run("bridge.status", || provider.status(transfer))
                .await?;
            match status {
                BridgeStatus::Settled { amount_received } => {
                    tracing::info!(transfer = %transfer, amount_received, "[ROUTER] Bridge hop settled");
                    return Ok(amount_received);
                }
                BridgeStatus::Failed(reason) => {
                    return Err(VenueError::Rejected(format!(
                        "bridge transfer {} failed: {}",
                        transfer, reason
                    )));
                }
                BridgeStatus::Pending => {
                    if Instant::now() >= deadline {
                        tracing::error!(transfer = %transfer, "[ROUTER] Bridge settlement timed out");
                        return Err(VenueError::NetworkTimeout(
                            self.config.settlement_timeout.as_millis() as u64,
                        ));
                    }
                    tracing::debug!(transfer = %transfer, "[ROUTER] Bridge hop pending");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn swap(
        &self,
        chain: Chain,
        sell_token: &str,
        buy_token: &str,
        sell_amount: f64,
    ) -> VenueResult<SwapFill> {
        if chain != self.swap.chain() {
            return Err(VenueError::Unsupported(format!("no swap venue on {}", chain)));
        }
        self.retry.run("swap.health", || self.swap.health()).await?;

        let amount = self.available(chain, sell_token, sell_amount).await?;
        if amount <= 0.0 {
            return Err(VenueError::Rejected(format!(
                "nothing to sell: no {} on {}",
                sell_token, chain
            )));
        }

        let quote = self
            .retry
            .run("swap.quote", || self.swap.quote(sell_token, buy_token, amount))
            .await?;
        let min_out = quote.amount_out * (1.0 - self.config.max_slippage);
        tracing::info!(
            sell = %sell_token,
            buy = %buy_token,
            amount,
            quoted_out = quote.amount_out,
            min_out,
            "[ROUTER] Executing swap"
        );
        self.swap.execute_swap(&quote, min_out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_utils::{
        MockBridge, MockLedger, MockPerpVenue, MockSwapVenue, MOCK_COLLATERAL,
    };
    use crate::core::rebalancer::chain_actions;
    use async_trait::async_trait;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter_ms: 0,
            call_timeout_ms: 500,
        }
    }

    fn config() -> RouterConfig {
        RouterConfig {
            transit_chain: Chain::Arbitrum,
            poll_interval: Duration::from_millis(5),
            settlement_timeout: Duration::from_millis(100),
            max_slippage: 0.01,
            perp_max_slippage: 0.01,
        }
    }

    struct World {
        ledger: Arc<MockLedger>,
        perp: Arc<MockPerpVenue>,
        swap: Arc<MockSwapVenue>,
        router: CrossChainRouter,
    }

    fn world() -> World {
        let ledger = MockLedger::new();
        ledger.set(Chain::Hyperliquid, MOCK_COLLATERAL, 3000.0);
        ledger.set(Chain::Unichain, "USDC", 500.0);
        let perp = Arc::new(MockPerpVenue::new(ledger.clone(), 2000.0));
        let swap = Arc::new(
            MockSwapVenue::new(ledger.clone(), Chain::Unichain)
                .with_price("USDC", 1.0)
                .with_price("WETH", 2000.0),
        );
        let bridges: Vec<Arc<dyn BridgeProvider>> = vec![
            Arc::new(MockBridge::new(
                ledger.clone(),
                "hl",
                vec![(Chain::Hyperliquid, Chain::Arbitrum)],
            )),
            Arc::new(
                MockBridge::new(ledger.clone(), "across", vec![(Chain::Arbitrum, Chain::Unichain)])
                    .with_fee(1.0),
            ),
        ];
        let router = CrossChainRouter::new(
            perp.clone(),
            swap.clone(),
            bridges,
            ledger.clone(),
            fast_retry(),
            config(),
        );
        World {
            ledger,
            perp,
            swap,
            router,
        }
    }

    fn case_a_actions() -> Vec<Action> {
        chain_actions(vec![
            ActionKind::BridgeTransfer {
                token: "USDC".into(),
                amount: 1875.0,
                source: Chain::Hyperliquid,
                dest: Chain::Unichain,
            },
            ActionKind::Swap {
                chain: Chain::Unichain,
                sell_token: "USDC".into(),
                buy_token: "WETH".into(),
                sell_amount: 2375.0,
            },
            ActionKind::PerpAdjust {
                asset: "ETH".into(),
                target_size: -1.6875,
                hedge: None,
            },
        ])
    }

    #[tokio::test]
    async fn test_full_plan_multi_hop() {
        let w = world();
        let report = w.router.execute(&case_a_actions()).await;

        assert!(report.is_complete(), "{:?}", report.outcome);
        assert_eq!(report.completed.len(), 3);
        match &report.completed[0].outcome {
            ActionOutcome::Bridged { transfers, amount_received, .. } => {
                assert_eq!(transfers.len(), 2);
                assert_eq!(transfers[0].provider, "hl");
                assert_eq!(transfers[1].provider, "across");
                assert!((amount_received - 1874.0).abs() < 1e-9);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Swap clamped to the 2374 USDC actually on the chain after the bridge fee
        assert!((w.ledger.get(Chain::Unichain, "WETH") - 2374.0 / 2000.0).abs() < 1e-9);
        assert_eq!(w.ledger.get(Chain::Unichain, "USDC"), 0.0);
        assert_eq!(w.perp.size(), -1.6875);
        assert!((w.ledger.get(Chain::Hyperliquid, MOCK_COLLATERAL) - 1125.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_second_action_failure_stops_plan() {
        let w = world();
        w.ledger.fail("quote");

        let report = w.router.execute(&case_a_actions()).await;

        assert_eq!(report.completed.len(), 1);
        assert!(matches!(report.outcome, ExecutionOutcome::Failed { step: 1, .. }));
        // Retried under the policy before giving up
        assert_eq!(w.ledger.call_count("quote"), 2);
        assert_eq!(w.ledger.call_count("adjust_position"), 0);
        assert_eq!(w.perp.size(), 0.0);
    }

    #[tokio::test]
    async fn test_swap_respects_min_out() {
        let w = world();
        w.swap.set_fill_ratio(0.95);
        let actions = chain_actions(vec![ActionKind::Swap {
            chain: Chain::Unichain,
            sell_token: "USDC".into(),
            buy_token: "WETH".into(),
            sell_amount: 100.0,
        }]);

        let report = w.router.execute(&actions).await;
        match report.outcome {
            ExecutionOutcome::Failed { step: 0, error } => assert!(error.contains("slippage")),
            other => panic!("unexpected {:?}", other),
        }
        // Reverted swaps are not retried
        assert_eq!(w.ledger.call_count("execute_swap"), 1);
    }

    #[tokio::test]
    async fn test_unwind_request_preempts_at_boundary() {
        let w = world();
        let switch = UnwindSwitch::new();
        let router = w.router.with_unwind_switch(switch.clone());
        switch.request();

        let report = router.execute(&case_a_actions()).await;
        assert_eq!(report.outcome, ExecutionOutcome::Preempted { next_step: 0 });
        assert!(report.completed.is_empty());
        assert_eq!(w.ledger.call_count("bridge"), 0);

        let report = router
            .execute_unpreemptible(&case_a_actions()[2..])
            .await;
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_unroutable_bridge_fails() {
        let w = world();
        let actions = chain_actions(vec![ActionKind::BridgeTransfer {
            token: "USDC".into(),
            amount: 10.0,
            source: Chain::Unichain,
            dest: Chain::Base,
        }]);
        let report = w.router.execute(&actions).await;
        match report.outcome {
            ExecutionOutcome::Failed { error, .. } => assert!(error.contains("no bridge route")),
            other => panic!("unexpected {:?}", other),
        }
    }

    struct StuckBridge;

    #[async_trait]
    impl BridgeProvider for StuckBridge {
        fn provider_name(&self) -> &'static str {
            "stuck"
        }
        fn supports(&self, _source: Chain, _dest: Chain) -> bool {
            true
        }
        async fn bridge(
            &self,
            _token: &str,
            _amount: f64,
            _source: Chain,
            _dest: Chain,
        ) -> VenueResult<TransferId> {
            Ok(TransferId::new("stuck", "1"))
        }
        async fn status(&self, _transfer: &TransferId) -> VenueResult<BridgeStatus> {
            Ok(BridgeStatus::Pending)
        }
    }

    /// Broadcasts, then takes longer than the per-call timeout to return
    struct SlowBridge {
        submits: std::sync::atomic::AtomicU32,
        delay: Duration,
    }

    #[async_trait]
    impl BridgeProvider for SlowBridge {
        fn provider_name(&self) -> &'static str {
            "slow"
        }
        fn supports(&self, _source: Chain, _dest: Chain) -> bool {
            true
        }
        async fn bridge(
            &self,
            _token: &str,
            _amount: f64,
            _source: Chain,
            _dest: Chain,
        ) -> VenueResult<TransferId> {
            let n = self.submits.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            Ok(TransferId::new("slow", n.to_string()))
        }
        async fn status(&self, _transfer: &TransferId) -> VenueResult<BridgeStatus> {
            Ok(BridgeStatus::Settled { amount_received: 10.0 })
        }
    }

    #[tokio::test]
    async fn test_slow_bridge_submit_is_sent_once() {
        let w = world();
        let bridge = Arc::new(SlowBridge {
            submits: std::sync::atomic::AtomicU32::new(0),
            delay: Duration::from_millis(60),
        });
        let retry = RetryPolicy {
            max_attempts: 3,
            call_timeout_ms: 20,
            ..fast_retry()
        };
        let router = CrossChainRouter::new(
            w.perp.clone(),
            w.swap.clone(),
            vec![bridge.clone() as Arc<dyn BridgeProvider>],
            w.ledger.clone(),
            retry,
            config(),
        );
        let actions = chain_actions(vec![ActionKind::BridgeTransfer {
            token: "USDC".into(),
            amount: 10.0,
            source: Chain::Unichain,
            dest: Chain::Hyperliquid,
        }]);

        let report = router.execute(&actions).await;

        assert!(report.is_complete(), "{:?}", report.outcome);
        assert_eq!(bridge.submits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(report.in_flight.is_empty());
        match &report.completed[0].outcome {
            ActionOutcome::Bridged { transfers, .. } => {
                assert_eq!(transfers, &vec![TransferId::new("slow", "1")])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_submits_are_not_retried() {
        let w = world();
        w.ledger.fail("bridge");
        let report = w.router.execute(&case_a_actions()).await;
        assert!(matches!(report.outcome, ExecutionOutcome::Failed { step: 0, .. }));
        assert_eq!(w.ledger.call_count("bridge"), 1);

        let w = world();
        w.ledger.fail("execute_swap");
        let report = w.router.execute(&case_a_actions()[1..]).await;
        assert!(matches!(report.outcome, ExecutionOutcome::Failed { .. }));
        assert_eq!(w.ledger.call_count("execute_swap"), 1);
    }

    #[tokio::test]
    async fn test_hedge_follows_realized_spot_after_fee_and_partial_fill() {
        let ledger = MockLedger::new();
        ledger.set(Chain::Unichain, "USDC", 4000.0);
        let perp = Arc::new(MockPerpVenue::new(ledger.clone(), 2000.0));
        let swap = Arc::new(
            MockSwapVenue::new(ledger.clone(), Chain::Unichain)
                .with_price("USDC", 1.0)
                .with_price("WETH", 2000.0),
        );
        swap.set_fill_ratio(0.996);
        let bridges: Vec<Arc<dyn BridgeProvider>> = vec![
            Arc::new(MockBridge::new(
                ledger.clone(),
                "hl",
                vec![(Chain::Hyperliquid, Chain::Arbitrum)],
            )),
            Arc::new(
                MockBridge::new(ledger.clone(), "across", vec![(Chain::Arbitrum, Chain::Unichain)])
                    .with_fee(2.0),
            ),
        ];
        let router = CrossChainRouter::new(
            perp.clone(),
            swap,
            bridges,
            ledger.clone(),
            fast_retry(),
            config(),
        );
        // Entry from flat as planned: collateral 1000, spot 3000, short 1.5
        let actions = chain_actions(vec![
            ActionKind::BridgeTransfer {
                token: "USDC".into(),
                amount: 1000.0,
                source: Chain::Unichain,
                dest: Chain::Hyperliquid,
            },
            ActionKind::Swap {
                chain: Chain::Unichain,
                sell_token: "USDC".into(),
                buy_token: "WETH".into(),
                sell_amount: 3000.0,
            },
            ActionKind::PerpAdjust {
                asset: "ETH".into(),
                target_size: -1.5,
                hedge: Some(HedgeLeg {
                    chain: Chain::Unichain,
                    token: "WETH".into(),
                }),
            },
        ]);

        let report = router.execute(&actions).await;

        assert!(report.is_complete(), "{:?}", report.outcome);
        let spot = ledger.get(Chain::Unichain, "WETH");
        assert!((spot - 1.494).abs() < 1e-9);
        assert!((perp.size() + spot).abs() < 1e-12);
        assert!((ledger.get(Chain::Hyperliquid, MOCK_COLLATERAL) - 998.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_settlement_timeout() {
        let w = world();
        let router = CrossChainRouter::new(
            w.perp.clone(),
            w.swap.clone(),
            vec![Arc::new(StuckBridge)],
            w.ledger.clone(),
            fast_retry(),
            config(),
        );
        let actions = chain_actions(vec![ActionKind::BridgeTransfer {
            token: "USDC".into(),
            amount: 10.0,
            source: Chain::Unichain,
            dest: Chain::Hyperliquid,
        }]);
        let report = router.execute(&actions).await;
        assert_eq!(report.in_flight, vec![TransferId::new("stuck", "1")]);
        match report.outcome {
            ExecutionOutcome::Failed { step: 0, error } => {
                assert!(error.contains("timeout"));
                assert!(error.contains("stuck:1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
