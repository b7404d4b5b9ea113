//! End-to-end strategy cycle against in-process venues
//!
//! Config comes from YAML, records go to a JSONL file, and every venue is a
//! mock sharing one ledger:
//! 1. Observe, then enter the position from a flat start
//! 2. Unwind: close, sell, consolidate on the withdrawal chain
//! 3. A partial snapshot leaves no state behind
//! 4. The flag file stops a running loop through a full unwind
//!
//! # Running the tests
//! ```bash
//! cargo test --test strategy_cycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;
use tokio::sync::broadcast;

use funding_arb::adapters::test_utils::{
    MockBridge, MockLedger, MockPerpVenue, MockSwapVenue, MOCK_COLLATERAL,
};
use funding_arb::adapters::types::NATIVE;
use funding_arb::adapters::{BridgeProvider, Chain};
use funding_arb::config::{load_config_from_str, AppConfig};
use funding_arb::core::{
    watch_unwind_flag, JsonlStateStore, LoopPhase, RecordKind, StateRecord, StateSink, StrategyDeps,
    StrategyLoop, TickOutcome, UnwindSwitch,
};
use funding_arb::AppError;

const CONFIG: &str = r#"
strategy:
  asset: ETH
  target_leverage: 3.0
  buffer: 0.5
  min_action_usd: 10.0
  fast_interval_secs: 1
  slow_interval_secs: 2
chains:
  perp: hyperliquid
  spot: unichain
  transit: arbitrum
  withdrawal: arbitrum
tokens:
  stable: USDC
  spot: WETH
  native_symbol: ETH
  addresses:
    unichain:
      USDC: "0x078D782b760474a361dDA0AF3839290b0EF57AD6"
      WETH: "0x4200000000000000000000000000000000000006"
gas:
  - chain: unichain
    min_native: 0.001
    target_native: 0.003
bridge:
  poll_interval_secs: 1
  settlement_timeout_secs: 5
retry:
  max_attempts: 2
  initial_delay_ms: 1
  max_delay_ms: 2
  jitter_ms: 0
  call_timeout_ms: 500
store:
  backend: jsonl
"#;

struct Harness {
    _dir: TempDir,
    config: AppConfig,
    ledger: Arc<MockLedger>,
    perp: Arc<MockPerpVenue>,
    store: Arc<JsonlStateStore>,
    unwind: UnwindSwitch,
    strategy: StrategyLoop,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = load_config_from_str(CONFIG).unwrap();
    config.store.path = dir.path().join("state.jsonl");
    config.control.unwind_flag_path = dir.path().join("UNWIND");
    config.control.poll_secs = 1;

    let ledger = MockLedger::new();
    ledger.set(Chain::Unichain, "USDC", 4000.0);
    ledger.set(Chain::Unichain, NATIVE, 0.01);
    let perp = Arc::new(MockPerpVenue::new(ledger.clone(), 2000.0));
    perp.set_funding_history(vec![0.0001; 48]);
    let swap = Arc::new(
        MockSwapVenue::new(ledger.clone(), Chain::Unichain)
            .with_price("USDC", 1.0)
            .with_price("WETH", 2000.0),
    );
    let bridges: Vec<Arc<dyn BridgeProvider>> = vec![
        Arc::new(MockBridge::new(
            ledger.clone(),
            "hyperliquid",
            vec![(Chain::Hyperliquid, Chain::Arbitrum)],
        )),
        Arc::new(MockBridge::new(
            ledger.clone(),
            "across",
            vec![(Chain::Arbitrum, Chain::Unichain)],
        )),
    ];
    let store = Arc::new(JsonlStateStore::new(&config.store.path));
    let unwind = UnwindSwitch::new();
    let strategy = StrategyLoop::new(
        &config,
        StrategyDeps {
            perp: perp.clone(),
            swap,
            bridges,
            balances: ledger.clone(),
            wrapper: ledger.clone(),
            store: store.clone(),
        },
        unwind.clone(),
    );

    Harness {
        _dir: dir,
        config,
        ledger,
        perp,
        store,
        unwind,
        strategy,
    }
}

async fn records(store: &JsonlStateStore) -> Vec<StateRecord> {
    let now = Utc::now();
    store
        .range(now - ChronoDuration::hours(1), now + ChronoDuration::hours(1))
        .await
        .unwrap()
}

fn kinds(records: &[StateRecord]) -> Vec<RecordKind> {
    records.iter().map(|r| r.kind).collect()
}

#[tokio::test]
async fn test_observe_enter_and_unwind() {
    let mut h = harness();

    let state = h.strategy.observe_tick().await.unwrap();
    assert_eq!(state.balance(Chain::Unichain, "USDC"), 4000.0);
    assert!(state.leverage().is_none());

    let outcome = h.strategy.rebalance_tick().await.unwrap();
    assert!(matches!(outcome, TickOutcome::Rebalanced { .. }), "{:?}", outcome);
    assert!((h.perp.size() + 1.5).abs() < 1e-9);
    assert!((h.ledger.get(Chain::Hyperliquid, MOCK_COLLATERAL) - 1000.0).abs() < 1e-6);
    assert!((h.ledger.get(Chain::Unichain, "WETH") - 1.5).abs() < 1e-9);

    h.unwind.request();
    let outcome = h.strategy.unwind().await.unwrap();
    assert_eq!(outcome, TickOutcome::Unwound);
    assert_eq!(h.strategy.phase(), LoopPhase::Halted);

    assert_eq!(h.perp.size(), 0.0);
    assert!(h.ledger.get(Chain::Unichain, "WETH").abs() < 1e-9);
    assert!(h.ledger.get(Chain::Hyperliquid, MOCK_COLLATERAL).abs() < 1e-6);
    assert!((h.ledger.get(Chain::Arbitrum, "USDC") - 4000.0).abs() < 1e-6);

    let log = records(&h.store).await;
    assert_eq!(
        kinds(&log),
        vec![
            RecordKind::Observation,
            RecordKind::Observation,
            RecordKind::PostRebalance,
            RecordKind::PostUnwind,
        ]
    );
    // append order is chronological
    assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    let last = log.last().and_then(|r| r.state.as_ref()).unwrap();
    assert!((last.balance(Chain::Arbitrum, "USDC") - 4000.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_partial_snapshot_persists_no_state() {
    let mut h = harness();
    h.ledger.fail("balance:unichain:WETH");

    let err = h.strategy.observe_tick().await.unwrap_err();
    match &err {
        AppError::PartialSnapshot { failures } => {
            assert!(failures.iter().any(|f| f.contains("WETH")), "{:?}", failures)
        }
        other => panic!("unexpected error {:?}", other),
    }

    let log = records(&h.store).await;
    assert_eq!(kinds(&log), vec![RecordKind::Error]);
    assert!(log[0].state.is_none());

    // A failed rebalance tick moves nothing either
    assert!(h.strategy.rebalance_tick().await.is_err());
    assert_eq!(h.ledger.call_count("bridge"), 0);
    assert_eq!(h.perp.size(), 0.0);
}

#[tokio::test]
async fn test_flag_file_halts_running_loop() {
    let mut h = harness();
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let watcher = tokio::spawn(watch_unwind_flag(
        h.config.control.unwind_flag_path.clone(),
        h.config.control.poll_interval(),
        h.unwind.clone(),
        shutdown_tx.subscribe(),
    ));
    tokio::fs::write(&h.config.control.unwind_flag_path, b"").await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(20), h.strategy.run(shutdown_rx))
        .await
        .expect("loop did not halt");
    assert!(result.is_ok());
    assert_eq!(h.strategy.phase(), LoopPhase::Halted);

    let log = records(&h.store).await;
    assert_eq!(log.last().map(|r| r.kind), Some(RecordKind::PostUnwind));
    assert_eq!(h.perp.size(), 0.0);

    let _ = shutdown_tx.send(());
    let _ = watcher.await;
}
