//! Core module - snapshots, funding evaluation, rebalancing, execution, state log
//!
//! # Module Architecture
//!
//! This module uses **explicit re-exports** instead of glob exports (`pub use module::*`)
//! to provide better API visibility and prevent accidental public API changes.
//!
//! ## Usage
//! Prefer importing from `crate::core`:
//! ```ignore
//! use crate::core::{StrategyLoop, StrategyDeps, UnwindSwitch};
//! ```

pub mod aggregator;
pub mod control;
pub mod funding;
pub mod gas;
pub mod guard;
pub mod rebalancer;
pub mod retry;
pub mod router;
pub mod runtime;
pub mod state;
pub mod store;
pub mod strategy;

// Explicit re-exports for state module
pub use state::{ChainBalance, PerpSnapshot, StrategyState};

// Explicit re-exports for store module
pub use store::{
    JsonlStateStore, MemoryStateStore, RecordKind, StateRecord, StateSink, StoreError,
    SupabaseStateStore,
};

// Explicit re-exports for the decision path
pub use aggregator::BalanceAggregator;
pub use funding::{is_profitable, FundingRateEvaluator, FundingStats, FundingVerdict};
pub use rebalancer::{
    Action, ActionKind, HedgeLeg, LeverageRebalancer, RebalanceCase, RebalanceDecision,
    RebalanceParams, RebalancePlan,
};

// Explicit re-exports for the execution path
pub use gas::{GasAction, GasCheck, GasSentinel, GasTarget, GasTransfer};
pub use router::{CrossChainRouter, ExecutionOutcome, ExecutionReport, RouterConfig};

// Explicit re-exports for control and scheduling
pub use control::{watch_unwind_flag, UnwindSwitch};
pub use guard::{OperationGuard, OperationPermit};
pub use retry::{RetryPolicy, Retryable};
pub use runtime::{build_chains, build_deps, build_store, spawn_signal_handler};
pub use strategy::{LoopPhase, StrategyDeps, StrategyLoop, TickOutcome};
