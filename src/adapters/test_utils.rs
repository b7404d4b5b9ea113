//! Shared test utilities for adapter and strategy testing
//!
//! All mocks share one `MockLedger`, so a bridge transfer or swap executed
//! through a mock is visible in the next snapshot. Collateral on the perp
//! venue is the ledger balance of `(Chain::Hyperliquid, "USDC")`.
//!
//! Any call can be made to fail by label with `MockLedger::fail`:
//! `account_value`, `position`, `mark_price`, `funding_rate`,
//! `funding_history`, `adjust_position`, `health`, `quote`, `execute_swap`,
//! `bridge`, `status`, `wrap`, `unwrap`, and `balance:<chain>:<token>`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::{BalanceSource, BridgeProvider, NativeWrapper, PerpVenue, SwapVenue};
use crate::adapters::types::{
    BridgeStatus, Chain, FundingSample, PerpFill, PositionInfo, SwapFill, SwapQuote, TransferId,
    NATIVE,
};

/// Collateral token on the mock perp venue
pub const MOCK_COLLATERAL: &str = "USDC";

/// Balances and failure switches shared by every mock
#[derive(Default)]
pub struct MockLedger {
    balances: Mutex<HashMap<(Chain, String), f64>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, chain: Chain, token: &str, amount: f64) {
        if let Ok(mut b) = self.balances.lock() {
            b.insert((chain, token.to_string()), amount);
        }
    }

    pub fn get(&self, chain: Chain, token: &str) -> f64 {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(&(chain, token.to_string())).copied())
            .unwrap_or(0.0)
    }

    pub fn credit(&self, chain: Chain, token: &str, amount: f64) {
        let current = self.get(chain, token);
        self.set(chain, token, current + amount);
    }

    pub fn debit(&self, chain: Chain, token: &str, amount: f64) -> VenueResult<()> {
        let current = self.get(chain, token);
        if current + 1e-9 < amount {
            return Err(VenueError::Rejected(format!(
                "insufficient {} on {}: have {}, need {}",
                token, chain, current, amount
            )));
        }
        self.set(chain, token, (current - amount).max(0.0));
        Ok(())
    }

    /// Make every call with `label` fail with a retryable error
    pub fn fail(&self, label: &str) {
        if let Ok(mut f) = self.failing.lock() {
            f.insert(label.to_string());
        }
    }

    pub fn heal(&self, label: &str) {
        if let Ok(mut f) = self.failing.lock() {
            f.remove(label);
        }
    }

    /// Record the call and return the injected failure, if any
    pub fn check(&self, label: &str) -> VenueResult<()> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(label.to_string());
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(label))
            .unwrap_or(false);
        if failing {
            Err(VenueError::ConnectionFailed(format!("injected failure: {}", label)))
        } else {
            Ok(())
        }
    }

    /// Every call label recorded so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, label: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == label).count()
    }
}

#[async_trait]
impl BalanceSource for MockLedger {
    async fn balance(&self, chain: Chain, token: &str) -> VenueResult<f64> {
        self.check(&format!("balance:{}:{}", chain, token))?;
        Ok(self.get(chain, token))
    }
}

#[async_trait]
impl NativeWrapper for MockLedger {
    async fn wrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()> {
        self.check("wrap")?;
        self.debit(chain, NATIVE, amount)?;
        self.credit(chain, wrapped_token, amount);
        Ok(())
    }

    async fn unwrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()> {
        self.check("unwrap")?;
        self.debit(chain, wrapped_token, amount)?;
        self.credit(chain, NATIVE, amount);
        Ok(())
    }
}

// =============================================================================
// Perp venue
// =============================================================================

pub struct MockPerpVenue {
    ledger: Arc<MockLedger>,
    size: Mutex<f64>,
    mark: Mutex<f64>,
    funding_rate: Mutex<f64>,
    history: Mutex<Vec<f64>>,
}

impl MockPerpVenue {
    pub fn new(ledger: Arc<MockLedger>, mark: f64) -> Self {
        Self {
            ledger,
            size: Mutex::new(0.0),
            mark: Mutex::new(mark),
            funding_rate: Mutex::new(0.0),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn set_size(&self, size: f64) {
        if let Ok(mut s) = self.size.lock() {
            *s = size;
        }
    }

    pub fn size(&self) -> f64 {
        self.size.lock().map(|s| *s).unwrap_or(0.0)
    }

    pub fn set_mark(&self, mark: f64) {
        if let Ok(mut m) = self.mark.lock() {
            *m = mark;
        }
    }

    /// Hourly funding history, oldest first, ending one hour ago
    pub fn set_funding_history(&self, rates: Vec<f64>) {
        if let Some(last) = rates.last() {
            if let Ok(mut f) = self.funding_rate.lock() {
                *f = *last;
            }
        }
        if let Ok(mut h) = self.history.lock() {
            *h = rates;
        }
    }

    fn mark(&self) -> f64 {
        self.mark.lock().map(|m| *m).unwrap_or(0.0)
    }
}

#[async_trait]
impl PerpVenue for MockPerpVenue {
    fn venue_name(&self) -> &'static str {
        "mock-perp"
    }

    async fn account_value(&self) -> VenueResult<f64> {
        self.ledger.check("account_value")?;
        Ok(self.ledger.get(Chain::Hyperliquid, MOCK_COLLATERAL))
    }

    async fn position(&self, asset: &str) -> VenueResult<PositionInfo> {
        self.ledger.check("position")?;
        let size = self.size();
        if size == 0.0 {
            return Ok(PositionInfo::flat(asset));
        }
        Ok(PositionInfo {
            asset: asset.to_string(),
            size,
            entry_price: self.mark(),
            liquidation_price: Some(self.mark() * 1.3),
        })
    }

    async fn mark_price(&self, _asset: &str) -> VenueResult<f64> {
        self.ledger.check("mark_price")?;
        Ok(self.mark())
    }

    async fn funding_rate(&self, _asset: &str) -> VenueResult<f64> {
        self.ledger.check("funding_rate")?;
        Ok(self.funding_rate.lock().map(|f| *f).unwrap_or(0.0))
    }

    async fn funding_history(
        &self,
        _asset: &str,
        window: Duration,
    ) -> VenueResult<Vec<FundingSample>> {
        self.ledger.check("funding_history")?;
        let now = Utc::now();
        let rates = self.history.lock().map(|h| h.clone()).unwrap_or_default();
        let n = rates.len() as i64;
        Ok(rates
            .into_iter()
            .enumerate()
            .map(|(i, rate)| FundingSample {
                timestamp: now - Duration::hours(n - i as i64),
                rate,
            })
            .filter(|s| s.timestamp >= now - window)
            .collect())
    }

    async fn adjust_position(
        &self,
        asset: &str,
        target_size: f64,
        _max_slippage: f64,
    ) -> VenueResult<PerpFill> {
        self.ledger.check("adjust_position")?;
        let delta = target_size - self.size();
        self.set_size(target_size);
        Ok(PerpFill {
            asset: asset.to_string(),
            filled_size: delta,
            avg_price: Some(self.mark()),
        })
    }
}

// =============================================================================
// Swap venue
// =============================================================================

/// Swaps at fixed USD prices per token, no fees
pub struct MockSwapVenue {
    ledger: Arc<MockLedger>,
    chain: Chain,
    prices: Mutex<HashMap<String, f64>>,
    fill_ratio: Mutex<f64>,
}

impl MockSwapVenue {
    pub fn new(ledger: Arc<MockLedger>, chain: Chain) -> Self {
        Self {
            ledger,
            chain,
            prices: Mutex::new(HashMap::new()),
            fill_ratio: Mutex::new(1.0),
        }
    }

    pub fn with_price(self, token: &str, usd: f64) -> Self {
        self.set_price(token, usd);
        self
    }

    pub fn set_price(&self, token: &str, usd: f64) {
        if let Ok(mut p) = self.prices.lock() {
            p.insert(token.to_string(), usd);
        }
    }

    /// Fraction of the quoted output actually delivered on execution
    pub fn set_fill_ratio(&self, ratio: f64) {
        if let Ok(mut r) = self.fill_ratio.lock() {
            *r = ratio;
        }
    }

    fn price(&self, token: &str) -> VenueResult<f64> {
        self.prices
            .lock()
            .ok()
            .and_then(|p| p.get(token).copied())
            .ok_or_else(|| VenueError::Rejected(format!("no pool for {}", token)))
    }
}

#[async_trait]
impl SwapVenue for MockSwapVenue {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn health(&self) -> VenueResult<()> {
        self.ledger.check("health")
    }

    async fn quote(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: f64,
    ) -> VenueResult<SwapQuote> {
        self.ledger.check("quote")?;
        let price = self.price(sell_token)? / self.price(buy_token)?;
        Ok(SwapQuote {
            sell_token: sell_token.to_string(),
            buy_token: buy_token.to_string(),
            sell_amount,
            amount_out: sell_amount * price,
            price,
            pool_address: None,
            protocol: Some("mock".into()),
            gas_estimate: Some(150_000),
        })
    }

    async fn execute_swap(&self, quote: &SwapQuote, min_amount_out: f64) -> VenueResult<SwapFill> {
        self.ledger.check("execute_swap")?;
        let ratio = self.fill_ratio.lock().map(|r| *r).unwrap_or(1.0);
        let out = quote.amount_out * ratio;
        if out < min_amount_out {
            return Err(VenueError::Reverted(format!(
                "slippage: out {} < min {}",
                out, min_amount_out
            )));
        }
        self.ledger
            .debit(self.chain, &quote.sell_token, quote.sell_amount)?;
        self.ledger.credit(self.chain, &quote.buy_token, out);
        Ok(SwapFill {
            tx_hash: format!("0xswap{}", self.ledger.call_count("execute_swap")),
            amount_out: out,
            gas_used: Some(120_000),
        })
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Bridge that debits on submit and credits on the first status poll
pub struct MockBridge {
    ledger: Arc<MockLedger>,
    name: &'static str,
    routes: Vec<(Chain, Chain)>,
    fee: f64,
    pending: Mutex<HashMap<String, (Chain, String, f64)>>,
    next_id: AtomicU64,
}

impl MockBridge {
    /// `routes` are bidirectional
    pub fn new(ledger: Arc<MockLedger>, name: &'static str, routes: Vec<(Chain, Chain)>) -> Self {
        Self {
            ledger,
            name,
            routes,
            fee: 0.0,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Flat fee deducted from each transfer
    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = fee;
        self
    }
}

#[async_trait]
impl BridgeProvider for MockBridge {
    fn provider_name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, source: Chain, dest: Chain) -> bool {
        self.routes
            .iter()
            .any(|&(a, b)| (a == source && b == dest) || (a == dest && b == source))
    }

    async fn bridge(
        &self,
        token: &str,
        amount: f64,
        source: Chain,
        dest: Chain,
    ) -> VenueResult<TransferId> {
        self.ledger.check("bridge")?;
        if !self.supports(source, dest) {
            return Err(VenueError::Unsupported(format!("{} -> {}", source, dest)));
        }
        self.ledger.debit(source, token, amount)?;
        let id = format!("{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Ok(mut p) = self.pending.lock() {
            p.insert(id.clone(), (dest, token.to_string(), amount - self.fee));
        }
        Ok(TransferId::new(self.name, id))
    }

    async fn status(&self, transfer: &TransferId) -> VenueResult<BridgeStatus> {
        self.ledger.check("status")?;
        let entry = self
            .pending
            .lock()
            .ok()
            .and_then(|mut p| p.remove(&transfer.id));
        match entry {
            Some((dest, token, amount)) => {
                self.ledger.credit(dest, &token, amount);
                Ok(BridgeStatus::Settled { amount_received: amount })
            }
            None => Err(VenueError::InvalidResponse(format!("unknown transfer {}", transfer))),
        }
    }
}
