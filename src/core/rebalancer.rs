//! Leverage rebalancer
//!
//! Pure planning: given a snapshot, decide whether leverage drifted out of
//! `[target − buffer, target + buffer]` and, if so, emit the ordered actions
//! that restore the target split between perp collateral and spot holdings.
//!
//! With `x` perp account value, `y` stable and `z` spot asset on the spot
//! chain, `p` mark price and `L` target leverage:
//!
//! ```text
//! T = x + y + z·p          total portfolio value
//! C = T / (L + 1)          target perp collateral
//! target size = −L·C / p   short, equal and opposite to the spot leg
//! ```
//!
//! Exactly one of three cases is selected, in priority order:
//! - A (`x ≥ C`): bridge the excess collateral to the spot chain, buy the asset
//! - B (`x + y ≥ C`): bridge the shortfall from spot stable, buy with the rest
//! - C (otherwise): sell asset for the shortfall, bridge all stable to the perp venue

use serde::{Deserialize, Serialize};

use crate::adapters::types::Chain;
use crate::core::state::StrategyState;

/// Static inputs of the planner
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceParams {
    pub target_leverage: f64,
    pub buffer: f64,
    /// Transfers and swaps worth less than this (USD) are skipped
    pub min_action_usd: f64,
    pub perp_chain: Chain,
    pub spot_chain: Chain,
    pub asset: String,
    pub stable_token: String,
    pub spot_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceCase {
    CaseA,
    CaseB,
    CaseC,
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionKind {
    BridgeTransfer {
        token: String,
        amount: f64,
        source: Chain,
        dest: Chain,
    },
    Swap {
        chain: Chain,
        sell_token: String,
        buy_token: String,
        sell_amount: f64,
    },
    PerpAdjust {
        asset: String,
        /// Size at plan time; superseded by `hedge` when set
        target_size: f64,
        /// Short exactly the spot holding found here when the action runs
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hedge: Option<HedgeLeg>,
    },
}

/// Spot holding the perp short mirrors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeLeg {
    pub chain: Chain,
    pub token: String,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::BridgeTransfer { .. } => "bridge_transfer",
            ActionKind::Swap { .. } => "swap",
            ActionKind::PerpAdjust { .. } => "perp_adjust",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub step: usize,
    pub kind: ActionKind,
    /// Step that must complete before this one
    pub depends_on: Option<usize>,
}

/// Chain `kinds` into sequential actions, each depending on the previous
pub fn chain_actions(kinds: Vec<ActionKind>) -> Vec<Action> {
    kinds
        .into_iter()
        .enumerate()
        .map(|(step, kind)| Action {
            step,
            kind,
            depends_on: step.checked_sub(1),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub case: RebalanceCase,
    pub total_value: f64,
    pub target_collateral: f64,
    pub target_size: f64,
    pub current_leverage: Option<f64>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RebalanceDecision {
    NoActionNeeded { leverage: Option<f64> },
    Rebalance(RebalancePlan),
}

impl RebalanceDecision {
    pub fn plan(&self) -> Option<&RebalancePlan> {
        match self {
            RebalanceDecision::Rebalance(plan) => Some(plan),
            RebalanceDecision::NoActionNeeded { .. } => None,
        }
    }
}

/// Select the structural case from perp collateral `x`, spot stable `y`
/// and target collateral `c`
pub fn select_case(x: f64, y: f64, c: f64) -> RebalanceCase {
    if x >= c {
        RebalanceCase::CaseA
    } else if x + y >= c {
        RebalanceCase::CaseB
    } else {
        RebalanceCase::CaseC
    }
}

/// Whether `leverage` lies inside `[target − buffer, target + buffer]`
pub fn within_band(leverage: Option<f64>, target: f64, buffer: f64) -> bool {
    match leverage {
        Some(l) => (l - target).abs() <= buffer,
        // No collateral: treat as out of band
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct LeverageRebalancer {
    params: RebalanceParams,
}

impl LeverageRebalancer {
    pub fn new(params: RebalanceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RebalanceParams {
        &self.params
    }

    pub fn plan(&self, state: &StrategyState) -> RebalanceDecision {
        plan(state, &self.params)
    }
}

/// Compute the rebalance decision for `state`. Pure.
pub fn plan(state: &StrategyState, params: &RebalanceParams) -> RebalanceDecision {
    let p = state.perp_position.mark_price;
    let x = state.perp_position.account_value;
    let y = state.balance(params.spot_chain, &params.stable_token);
    let z = state.balance(params.spot_chain, &params.spot_token);
    let total = x + y + z * p;
    let leverage = state.leverage();

    if total <= 0.0 || p <= 0.0 || !total.is_finite() {
        return RebalanceDecision::NoActionNeeded { leverage };
    }
    if within_band(leverage, params.target_leverage, params.buffer) {
        return RebalanceDecision::NoActionNeeded { leverage };
    }

    let l = params.target_leverage;
    let c = total / (l + 1.0);
    let target_size = -l * c / p;
    let case = select_case(x, y, c);
    let min = params.min_action_usd;

    let mut kinds = Vec::with_capacity(3);
    match case {
        RebalanceCase::CaseA => {
            let excess = x - c;
            if excess >= min {
                kinds.push(bridge(params, excess, params.perp_chain, params.spot_chain));
            }
            let stable_to_spend = if excess >= min { y + excess } else { y };
            if stable_to_spend >= min {
                kinds.push(swap(params, &params.stable_token, &params.spot_token, stable_to_spend));
            }
        }
        RebalanceCase::CaseB => {
            let shortfall = c - x;
            if shortfall >= min {
                kinds.push(bridge(params, shortfall, params.spot_chain, params.perp_chain));
            }
            let remaining = y - shortfall;
            if remaining >= min {
                kinds.push(swap(params, &params.stable_token, &params.spot_token, remaining));
            }
        }
        RebalanceCase::CaseC => {
            let needed_usd = c - x - y;
            if needed_usd >= min {
                kinds.push(swap(params, &params.spot_token, &params.stable_token, needed_usd / p));
            }
            let to_bridge = if needed_usd >= min { y + needed_usd } else { y };
            if to_bridge >= min {
                kinds.push(bridge(params, to_bridge, params.spot_chain, params.perp_chain));
            }
        }
    }
    kinds.push(ActionKind::PerpAdjust {
        asset: params.asset.clone(),
        target_size,
        hedge: Some(HedgeLeg {
            chain: params.spot_chain,
            token: params.spot_token.clone(),
        }),
    });

    RebalanceDecision::Rebalance(RebalancePlan {
        case,
        total_value: total,
        target_collateral: c,
        target_size,
        current_leverage: leverage,
        actions: chain_actions(kinds),
    })
}

fn bridge(params: &RebalanceParams, amount: f64, source: Chain, dest: Chain) -> ActionKind {
    ActionKind::BridgeTransfer {
        token: params.stable_token.clone(),
        amount,
        source,
        dest,
    }
}

fn swap(params: &RebalanceParams, sell: &str, buy: &str, sell_amount: f64) -> ActionKind {
    ActionKind::Swap {
        chain: params.spot_chain,
        sell_token: sell.to_string(),
        buy_token: buy.to_string(),
        sell_amount,
    }
}
