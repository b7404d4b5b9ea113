//! Strategy loop
//!
//! One task, two timers. The fast tick observes: snapshot, state log, gas.
//! The slow tick observes too, then evaluates funding, plans and executes a
//! rebalance. An unwind request (flag file or [`UnwindSwitch::request`])
//! closes the perp, sells the spot asset, consolidates everything on the
//! withdrawal chain and halts the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapters::traits::{BalanceSource, BridgeProvider, NativeWrapper, PerpVenue, SwapVenue};
use crate::adapters::types::Chain;
use crate::config::AppConfig;
use crate::core::aggregator::BalanceAggregator;
use crate::core::control::UnwindSwitch;
use crate::core::funding::{FundingRateEvaluator, FundingVerdict};
use crate::core::gas::{GasSentinel, GasTransfer};
use crate::core::guard::OperationGuard;
use crate::core::rebalancer::{chain_actions, Action, ActionKind, LeverageRebalancer, RebalanceCase, RebalanceDecision};
use crate::core::retry::RetryPolicy;
use crate::core::router::{CrossChainRouter, ExecutionOutcome, ExecutionReport};
use crate::core::state::StrategyState;
use crate::core::store::{StateRecord, StateSink};
use crate::error::AppError;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Observing,
    Deciding,
    Idle,
    Rebalancing,
    Unwinding,
    /// Terminal, reached after a completed unwind
    Halted,
}

/// What a successful slow tick (or unwind) did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoAction { leverage: Option<f64> },
    /// Flat position and funding not profitable: no entry
    EntryGated { verdict: FundingVerdict },
    Rebalanced { case: RebalanceCase, actions: usize },
    /// Stopped at an action boundary for a pending unwind
    Preempted { completed: usize },
    /// Another operation holds the guard
    Busy,
    Unwound,
}

/// External collaborators the loop drives
pub struct StrategyDeps {
    pub perp: Arc<dyn PerpVenue>,
    pub swap: Arc<dyn SwapVenue>,
    pub bridges: Vec<Arc<dyn BridgeProvider>>,
    pub balances: Arc<dyn BalanceSource>,
    /// Wraps native gas so it can be bridged between chains
    pub wrapper: Arc<dyn NativeWrapper>,
    pub store: Arc<dyn StateSink>,
}

pub struct StrategyLoop {
    asset: String,
    stable_token: String,
    spot_token: String,
    perp_chain: Chain,
    spot_chain: Chain,
    transit_chain: Chain,
    withdrawal_chain: Chain,
    min_action_usd: f64,
    stranded_threshold: f64,
    fast_interval: Duration,
    slow_interval: Duration,
    funding_lookback: chrono::Duration,

    perp: Arc<dyn PerpVenue>,
    store: Arc<dyn StateSink>,
    retry: RetryPolicy,
    aggregator: BalanceAggregator,
    funding: FundingRateEvaluator,
    rebalancer: LeverageRebalancer,
    router: CrossChainRouter,
    gas: GasSentinel,
    guard: OperationGuard,
    unwind: UnwindSwitch,
    phase: LoopPhase,
}

impl StrategyLoop {
    pub fn new(config: &AppConfig, deps: StrategyDeps, unwind: UnwindSwitch) -> Self {
        let retry = config.retry.clone();
        let aggregator = BalanceAggregator::new(
            deps.perp.clone(),
            deps.balances.clone(),
            retry.clone(),
            &config.strategy.asset,
            config.tracked_balances(),
        );
        let router = CrossChainRouter::new(
            deps.perp.clone(),
            deps.swap.clone(),
            deps.bridges,
            deps.balances,
            retry.clone(),
            config.router_config(),
        )
        .with_unwind_switch(unwind.clone());
        let gas = GasSentinel::new(
            deps.swap,
            retry.clone(),
            config.gas.clone(),
            &config.tokens.native_symbol,
            &config.tokens.stable,
            &config.tokens.spot,
            config.strategy.max_slippage,
        )
        .with_transfer(GasTransfer {
            router: router.clone(),
            wrapper: deps.wrapper,
            wrapped_token: config.tokens.wrapped_native.clone(),
        });

        Self {
            asset: config.strategy.asset.clone(),
            stable_token: config.tokens.stable.clone(),
            spot_token: config.tokens.spot.clone(),
            perp_chain: config.chains.perp,
            spot_chain: config.chains.spot,
            transit_chain: config.chains.transit,
            withdrawal_chain: config.chains.withdrawal,
            min_action_usd: config.strategy.min_action_usd,
            stranded_threshold: config.bridge.stranded_threshold,
            fast_interval: config.fast_interval(),
            slow_interval: config.slow_interval(),
            funding_lookback: config.funding_lookback(),
            perp: deps.perp,
            store: deps.store,
            retry,
            aggregator,
            funding: FundingRateEvaluator::new(config.funding_lookback(), config.funding_sampling()),
            rebalancer: LeverageRebalancer::new(config.rebalance_params()),
            router,
            gas,
            guard: OperationGuard::new(),
            unwind,
            phase: LoopPhase::Idle,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn funding(&self) -> &FundingRateEvaluator {
        &self.funding
    }

    pub fn guard(&self) -> OperationGuard {
        self.guard.clone()
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        if self.phase != phase {
            debug!(from = ?self.phase, to = ?phase, "[STRATEGY] Phase change");
            self.phase = phase;
        }
    }

    /// Drive both timers until shutdown or a completed unwind
    pub async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), AppError> {
        let unwind = self.unwind.clone();
        let mut fast = interval(self.fast_interval);
        fast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut slow = interval(self.slow_interval);
        slow.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // After a failed unwind the switch stays raised; retry on the slow tick only
        let mut unwind_failed = false;

        info!(
            asset = %self.asset,
            fast_secs = self.fast_interval.as_secs(),
            slow_secs = self.slow_interval.as_secs(),
            "[STRATEGY] Loop started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    info!(phase = ?self.phase, "[STRATEGY] Shutdown signal received");
                    break;
                }
                _ = unwind.requested(), if !unwind_failed => {
                    if let Ok(TickOutcome::Unwound) = self.unwind().await {
                        break;
                    }
                    unwind_failed = true;
                }
                _ = slow.tick() => {
                    if unwind.is_requested() {
                        if let Ok(TickOutcome::Unwound) = self.unwind().await {
                            break;
                        }
                        continue;
                    }
                    if let Ok(outcome) = self.rebalance_tick().await {
                        debug!(outcome = ?outcome, "[STRATEGY] Slow tick finished");
                    }
                    // The slow tick already observed
                    fast.reset();
                }
                _ = fast.tick() => {
                    let _ = self.observe_tick().await;
                }
            }
        }

        info!(phase = ?self.phase, "[STRATEGY] Loop stopped");
        Ok(())
    }

    /// Fast tick: snapshot, log it, check gas
    ///
    /// Failures are logged and appended to the state log as `Error` records.
    pub async fn observe_tick(&mut self) -> Result<StrategyState, AppError> {
        let result = self.observe().await;
        if let Err(e) = &result {
            self.record_failure(e).await;
        }
        self.set_phase(LoopPhase::Idle);
        result
    }

    /// Slow tick: observe, evaluate funding, plan and execute
    pub async fn rebalance_tick(&mut self) -> Result<TickOutcome, AppError> {
        let result = self.rebalance().await;
        if let Err(e) = &result {
            self.record_failure(e).await;
        }
        self.set_phase(LoopPhase::Idle);
        result
    }

    /// Close everything and consolidate on the withdrawal chain
    pub async fn unwind(&mut self) -> Result<TickOutcome, AppError> {
        let result = self.run_unwind().await;
        if let Err(e) = &result {
            self.record_failure(e).await;
        }
        result
    }

    async fn observe(&mut self) -> Result<StrategyState, AppError> {
        self.set_phase(LoopPhase::Observing);
        let state = self.aggregator.snapshot().await?;
        self.append(StateRecord::observation(state.clone())).await;
        self.report_stranded(&state);
        self.gas.ensure_gas(&state).await;
        Ok(state)
    }

    fn report_stranded(&self, state: &StrategyState) {
        if self.transit_chain == self.spot_chain {
            return;
        }
        let stranded = state.balance(self.transit_chain, &self.stable_token);
        if stranded > self.stranded_threshold {
            warn!(
                chain = %self.transit_chain,
                token = %self.stable_token,
                amount = stranded,
                "[SNAPSHOT] Stable balance stranded on transit chain"
            );
        }
    }

    async fn evaluate_funding(&mut self) -> Result<FundingVerdict, AppError> {
        let now = Utc::now();
        let perp = &self.perp;
        let asset = self.asset.as_str();
        let window = self.funding_lookback;
        let samples = self
            .retry
            .run("perp.funding_history", || perp.funding_history(asset, window))
            .await?;

        self.funding.refresh(now, samples);
        let verdict = self.funding.verdict();
        match self.funding.stats() {
            Some(stats) => info!(
                mean = stats.mean,
                stddev = stats.stddev,
                samples = stats.count,
                verdict = ?verdict,
                "[FUNDING] Funding evaluated"
            ),
            None => warn!(
                samples = self.funding.samples().len(),
                "[FUNDING] Not enough funding samples for a verdict"
            ),
        }
        Ok(verdict)
    }

    async fn rebalance(&mut self) -> Result<TickOutcome, AppError> {
        let state = self.observe().await?;

        self.set_phase(LoopPhase::Deciding);
        // Without funding data entry stays gated; maintenance still runs
        let verdict = match self.evaluate_funding().await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "[FUNDING] Funding history unavailable, treating as insufficient data");
                FundingVerdict::InsufficientData
            }
        };
        let flat = state.perp_position.is_flat();

        if verdict == FundingVerdict::Unprofitable && !flat {
            warn!(asset = %self.asset, "[FUNDING] Funding unprofitable, unwind recommended");
        }

        let plan = match self.rebalancer.plan(&state) {
            RebalanceDecision::NoActionNeeded { leverage } => {
                info!(leverage = ?leverage, "[REBALANCE] Leverage within band, no action");
                return Ok(TickOutcome::NoAction { leverage });
            }
            RebalanceDecision::Rebalance(plan) => plan,
        };

        if flat && verdict != FundingVerdict::Profitable {
            info!(verdict = ?verdict, "[REBALANCE] Position flat and funding not profitable, not entering");
            return Ok(TickOutcome::EntryGated { verdict });
        }

        let Some(permit) = self.guard.try_acquire("rebalance") else {
            warn!("[REBALANCE] Another operation in progress, skipping");
            return Ok(TickOutcome::Busy);
        };

        self.set_phase(LoopPhase::Rebalancing);
        info!(
            case = ?plan.case,
            leverage = ?plan.current_leverage,
            total_value = plan.total_value,
            target_collateral = plan.target_collateral,
            target_size = plan.target_size,
            actions = plan.actions.len(),
            "[REBALANCE] Executing plan"
        );

        let report = self.router.execute(&plan.actions).await;
        let completed = report.completed.len();
        match report.outcome {
            ExecutionOutcome::Completed => {}
            ExecutionOutcome::Preempted { next_step } => {
                info!(completed, next_step, "[REBALANCE] Plan preempted by unwind request");
                return Ok(TickOutcome::Preempted { completed });
            }
            ExecutionOutcome::Failed { step, error } => {
                return Err(AppError::PlanExecution {
                    step,
                    completed,
                    reason: error,
                });
            }
        }

        let after = self.aggregator.snapshot().await?;
        self.append(StateRecord::post_rebalance(
            after.clone(),
            format!("{:?}: {} actions", plan.case, completed),
        ))
        .await;
        self.gas.ensure_gas(&after).await;
        permit.release();

        info!(
            case = ?plan.case,
            leverage = ?after.leverage(),
            "[REBALANCE] Plan completed"
        );
        Ok(TickOutcome::Rebalanced {
            case: plan.case,
            actions: completed,
        })
    }

    async fn run_unwind(&mut self) -> Result<TickOutcome, AppError> {
        let Some(_permit) = self.guard.try_acquire("unwind") else {
            warn!("[UNWIND] Another operation in progress, deferring");
            return Ok(TickOutcome::Busy);
        };
        self.set_phase(LoopPhase::Unwinding);
        warn!(withdrawal_chain = %self.withdrawal_chain, "[UNWIND] Unwind started");

        let state = self.aggregator.snapshot().await?;
        let close = self.close_actions(&state);
        if !close.is_empty() {
            check_report(self.router.execute_unpreemptible(&close).await)?;
        }

        let closed = self.aggregator.snapshot().await?;
        let consolidate = self.consolidation_actions(&closed);
        if !consolidate.is_empty() {
            check_report(self.router.execute_unpreemptible(&consolidate).await)?;
        }

        let last = self.aggregator.snapshot().await?;
        self.append(StateRecord::post_unwind(last.clone())).await;
        self.set_phase(LoopPhase::Halted);
        info!(
            withdrawal_chain = %self.withdrawal_chain,
            balance = last.balance(self.withdrawal_chain, &self.stable_token),
            "[UNWIND] Unwind completed, loop halted"
        );
        Ok(TickOutcome::Unwound)
    }

    /// Close the perp, then sell the spot asset for stable
    fn close_actions(&self, state: &StrategyState) -> Vec<Action> {
        let mut kinds = Vec::with_capacity(2);
        if !state.perp_position.is_flat() {
            kinds.push(ActionKind::PerpAdjust {
                asset: self.asset.clone(),
                target_size: 0.0,
                hedge: None,
            });
        }
        let spot = state.balance(self.spot_chain, &self.spot_token);
        if spot * state.perp_position.mark_price >= self.min_action_usd && spot > 0.0 {
            kinds.push(ActionKind::Swap {
                chain: self.spot_chain,
                sell_token: self.spot_token.clone(),
                buy_token: self.stable_token.clone(),
                sell_amount: spot,
            });
        }
        chain_actions(kinds)
    }

    /// Move every stable balance to the withdrawal chain
    fn consolidation_actions(&self, state: &StrategyState) -> Vec<Action> {
        let mut kinds = Vec::with_capacity(3);
        let collateral = state.perp_position.account_value;
        if collateral >= self.min_action_usd && self.perp_chain != self.withdrawal_chain {
            kinds.push(self.to_withdrawal(collateral, self.perp_chain));
        }
        for chain in [self.spot_chain, self.transit_chain] {
            if chain == self.withdrawal_chain || chain == self.perp_chain {
                continue;
            }
            let amount = state.balance(chain, &self.stable_token);
            if amount >= self.min_action_usd {
                kinds.push(self.to_withdrawal(amount, chain));
            }
        }
        chain_actions(kinds)
    }

    fn to_withdrawal(&self, amount: f64, source: Chain) -> ActionKind {
        ActionKind::BridgeTransfer {
            token: self.stable_token.clone(),
            amount,
            source,
            dest: self.withdrawal_chain,
        }
    }

    async fn append(&self, record: StateRecord) {
        if let Err(e) = self.store.append(&record).await {
            warn!(kind = ?record.kind, error = %e, "[STORE] Failed to append state record");
        }
    }

    async fn record_failure(&self, err: &AppError) {
        if err.is_operator_visible() {
            error!(phase = ?self.phase, error = %err, "[STRATEGY] Tick failed");
        } else {
            warn!(phase = ?self.phase, error = %err, "[STRATEGY] Tick failed");
        }
        self.append(StateRecord::error(Utc::now(), err.to_string())).await;
    }
}

fn check_report(report: ExecutionReport) -> Result<(), AppError> {
    match report.outcome {
        ExecutionOutcome::Failed { step, error } => Err(AppError::PlanExecution {
            step,
            completed: report.completed.len(),
            reason: error,
        }),
        _ => Ok(()),
    }
}
