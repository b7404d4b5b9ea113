//! Balance aggregation
//!
//! One synchronized round of queries against the perp venue and every
//! tracked (chain, token) pair, issued concurrently. Each sub-query is
//! retried on its own; the aggregator itself never retries. Any failure
//! discards the whole round.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;

use crate::adapters::errors::VenueResult;
use crate::adapters::traits::{BalanceSource, PerpVenue};
use crate::adapters::types::Chain;
use crate::core::retry::RetryPolicy;
use crate::core::state::{ChainBalance, PerpSnapshot, StrategyState};
use crate::error::AppError;

pub struct BalanceAggregator {
    perp: Arc<dyn PerpVenue>,
    balances: Arc<dyn BalanceSource>,
    retry: RetryPolicy,
    asset: String,
    tracked: Vec<(Chain, String)>,
}

impl BalanceAggregator {
    pub fn new(
        perp: Arc<dyn PerpVenue>,
        balances: Arc<dyn BalanceSource>,
        retry: RetryPolicy,
        asset: &str,
        tracked: Vec<(Chain, String)>,
    ) -> Self {
        Self {
            perp,
            balances,
            retry,
            asset: asset.to_string(),
            tracked,
        }
    }

    pub fn tracked(&self) -> &[(Chain, String)] {
        &self.tracked
    }

    /// Take a complete snapshot or fail with `PartialSnapshot` naming every failed query
    pub async fn snapshot(&self) -> Result<StrategyState, AppError> {
        let asset = self.asset.as_str();
        let perp = &self.perp;

        let perp_queries = async {
            tokio::join!(
                self.retry.run("perp.account_value", || perp.account_value()),
                self.retry.run("perp.position", || perp.position(asset)),
                self.retry.run("perp.mark_price", || perp.mark_price(asset)),
                self.retry.run("perp.funding_rate", || perp.funding_rate(asset)),
            )
        };
        let balance_queries = join_all(self.tracked.iter().map(|(chain, token)| {
            let chain = *chain;
            let balances = &self.balances;
            async move {
                let label = format!("{}.{}", chain, token);
                let result: VenueResult<f64> = self
                    .retry
                    .run(&label, move || balances.balance(chain, token))
                    .await;
                (chain, token.clone(), label, result)
            }
        }));

        let ((account_value, position, mark_price, funding), balance_results) =
            tokio::join!(perp_queries, balance_queries);

        let mut failures = Vec::new();
        let mut note = |label: &str, err: &dyn std::fmt::Display| {
            failures.push(format!("{}: {}", label, err));
        };

        let account_value = account_value
            .map_err(|e| note("perp.account_value", &e))
            .ok();
        let position = position.map_err(|e| note("perp.position", &e)).ok();
        let mark_price = mark_price.map_err(|e| note("perp.mark_price", &e)).ok();
        let funding = funding.map_err(|e| note("perp.funding_rate", &e)).ok();

        let mut chain_balances = Vec::with_capacity(balance_results.len());
        for (chain, token, label, result) in balance_results {
            match result {
                Ok(amount) => chain_balances.push(ChainBalance { chain, token, amount }),
                Err(e) => note(&label, &e),
            }
        }

        match (account_value, position, mark_price, funding) {
            (Some(account_value), Some(position), Some(mark_price), Some(funding))
                if failures.is_empty() =>
            {
                let perp_position = PerpSnapshot::new(
                    position.size,
                    position.entry_price,
                    mark_price,
                    position.liquidation_price,
                    account_value,
                );
                let state = StrategyState::new(
                    Utc::now(),
                    &self.asset,
                    perp_position,
                    chain_balances,
                    Some(funding),
                );
                tracing::info!(
                    account_value = state.perp_position.account_value,
                    size = state.perp_position.size,
                    mark_price = state.perp_position.mark_price,
                    leverage = ?state.perp_position.leverage,
                    funding = ?state.funding_snapshot,
                    balances = state.chain_balances.len(),
                    "[SNAPSHOT] Snapshot taken"
                );
                Ok(state)
            }
            _ => {
                tracing::warn!(failed = failures.len(), failures = ?failures, "[SNAPSHOT] Snapshot discarded");
                Err(AppError::PartialSnapshot { failures })
            }
        }
    }
}
