//! One-shot strategy snapshot
//!
//! Reads every balance the strategy tracks, the funding window and the
//! rebalance decision, and prints them as JSON. Places no orders and moves
//! no funds.
//!
//! Usage:
//! ```bash
//! cargo run --bin snapshot
//! ```
//!
//! Requires the same `.env` / `config.yaml` as the main binary.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use funding_arb::config::{self, logging::init_logging, Credentials};
use funding_arb::core::{build_deps, BalanceAggregator, FundingRateEvaluator, LeverageRebalancer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = config::load_config(&config::config_path())?;
    let credentials = Credentials::from_env(&config)?;
    let deps = build_deps(&config, &credentials)?;

    let aggregator = BalanceAggregator::new(
        deps.perp.clone(),
        deps.balances.clone(),
        config.retry.clone(),
        &config.strategy.asset,
        config.tracked_balances(),
    );
    let state = aggregator.snapshot().await?;
    info!(leverage = ?state.leverage(), "[SNAPSHOT] Balances captured");

    let history = config
        .retry
        .run("perp.funding_history", || {
            deps.perp
                .funding_history(&config.strategy.asset, config.funding_lookback())
        })
        .await?;
    let mut funding = FundingRateEvaluator::new(config.funding_lookback(), config.funding_sampling());
    funding.refresh(Utc::now(), history);

    let decision = LeverageRebalancer::new(config.rebalance_params()).plan(&state);

    let report = json!({
        "state": state,
        "total_value": state.total_value(config.chains.spot, &config.tokens.stable, &config.tokens.spot),
        "funding": {
            "samples": funding.samples().len(),
            "stats": funding.stats(),
            "verdict": funding.verdict(),
        },
        "decision": decision,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
