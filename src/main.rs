//! Funding-rate arbitrage strategy - entry point
//!
//! 1. Loads `.env`, logging and `config.yaml` (or `$FUNDING_ARB_CONFIG`)
//! 2. Reads credentials and builds the venue, chain and bridge adapters
//! 3. Spawns the Ctrl+C handler and the unwind flag watcher
//! 4. Runs the strategy loop until shutdown or a completed unwind

use tokio::sync::broadcast;
use tracing::{error, info};

use funding_arb::config::{self, logging::init_logging, Credentials};
use funding_arb::core::{build_deps, spawn_signal_handler, watch_unwind_flag, LoopPhase, StrategyLoop, UnwindSwitch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let path = config::config_path();
    info!(path = %path.display(), "[CONFIG] Loading configuration");
    let config = match config::load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("[ERROR] Configuration failed: {}", e);
            std::process::exit(1);
        }
    };
    let credentials = match Credentials::from_env(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("[ERROR] Configuration failed: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        asset = %config.strategy.asset,
        target_leverage = config.strategy.target_leverage,
        buffer = config.strategy.buffer,
        perp = %config.chains.perp,
        spot = %config.chains.spot,
        transit = %config.chains.transit,
        withdrawal = %config.chains.withdrawal,
        fast_s = config.strategy.fast_interval_secs,
        slow_s = config.strategy.slow_interval_secs,
        "[CONFIG] Strategy configuration"
    );

    let deps = build_deps(&config, &credentials)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    spawn_signal_handler(shutdown_tx.clone());

    let unwind = UnwindSwitch::new();
    let watcher = tokio::spawn(watch_unwind_flag(
        config.control.unwind_flag_path.clone(),
        config.control.poll_interval(),
        unwind.clone(),
        shutdown_tx.subscribe(),
    ));

    let mut strategy = StrategyLoop::new(&config, deps, unwind);
    info!("[STRATEGY] Starting strategy loop");
    let result = strategy.run(shutdown_rx).await;

    let _ = shutdown_tx.send(());
    let _ = watcher.await;

    match result {
        Ok(()) if strategy.phase() == LoopPhase::Halted => {
            info!("[SHUTDOWN] Unwind complete, strategy halted");
        }
        Ok(()) => info!("[SHUTDOWN] Clean exit"),
        Err(e) => {
            error!(error = %e, "[SHUTDOWN] Strategy loop failed");
            return Err(e.into());
        }
    }
    Ok(())
}
