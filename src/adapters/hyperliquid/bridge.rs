//! Native Hyperliquid <-> Arbitrum USDC bridge
//!
//! Deposits are a plain USDC transfer to the Bridge2 contract on Arbitrum and
//! show up as a `deposit` entry in the user's ledger. Withdrawals are a
//! signed `withdraw3` action; the venue keeps a flat fee and the rest lands
//! in the wallet on Arbitrum.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ethers::core::types::Address;
use tokio::sync::Mutex;

use super::client::HyperliquidAdapter;
use super::wire::parse_wire;
use crate::adapters::chain::EvmChains;
use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::BridgeProvider;
use crate::adapters::types::{BridgeStatus, Chain, TransferId};

pub const BRIDGE2_ADDRESS: &str = "0x2Df1c51E09aECF9cacB7bc98cB1742757f163dF7";
/// Deposits below this are lost
pub const MIN_DEPOSIT_USDC: f64 = 5.0;
pub const WITHDRAW_FEE_USDC: f64 = 1.0;
/// Only collateral asset the bridge moves
pub const COLLATERAL: &str = "USDC";

const PROVIDER: &str = "hyperliquid";
const AMOUNT_TOLERANCE: f64 = 0.01;
/// Ledger lookback slack for deposit detection
const LEDGER_SLACK_MS: i64 = 60_000;

#[derive(Debug, Clone)]
enum PendingLeg {
    Deposit { amount: f64, since_ms: i64 },
    Withdraw { expected: f64, baseline: f64 },
}

pub struct HyperliquidBridge {
    venue: Arc<HyperliquidAdapter>,
    chains: Arc<EvmChains>,
    pending: Mutex<HashMap<String, PendingLeg>>,
    /// Ledger hashes already matched to a deposit
    claimed: Mutex<HashSet<String>>,
}

impl HyperliquidBridge {
    pub fn new(venue: Arc<HyperliquidAdapter>, chains: Arc<EvmChains>) -> Self {
        Self {
            venue,
            chains,
            pending: Mutex::new(HashMap::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    async fn deposit(&self, amount: f64) -> VenueResult<TransferId> {
        if amount < MIN_DEPOSIT_USDC {
            return Err(VenueError::Rejected(format!(
                "hyperliquid deposit of {} is below the {} USDC minimum",
                amount, MIN_DEPOSIT_USDC
            )));
        }
        let bridge: Address = BRIDGE2_ADDRESS
            .parse()
            .map_err(|e| VenueError::InvalidResponse(format!("bad bridge address: {}", e)))?;
        let since_ms = Utc::now().timestamp_millis() - LEDGER_SLACK_MS;
        let tx_hash = self
            .chains
            .get(Chain::Arbitrum)?
            .transfer(COLLATERAL, bridge, amount)
            .await?;
        let id = format!("{:?}", tx_hash);
        tracing::info!(amount, tx_hash = %id, "[HYPERLIQUID] Deposit sent to bridge");
        self.pending
            .lock()
            .await
            .insert(id.clone(), PendingLeg::Deposit { amount, since_ms });
        Ok(TransferId::new(PROVIDER, id))
    }

    async fn withdraw(&self, amount: f64) -> VenueResult<TransferId> {
        if amount <= WITHDRAW_FEE_USDC {
            return Err(VenueError::Rejected(format!(
                "hyperliquid withdrawal of {} does not cover the {} USDC fee",
                amount, WITHDRAW_FEE_USDC
            )));
        }
        let arbitrum = self.chains.get(Chain::Arbitrum)?;
        let baseline = arbitrum.token_balance(COLLATERAL).await?;
        let destination = format!("{:?}", arbitrum.wallet_address());
        let nonce = self.venue.withdraw(&destination, amount).await?;
        let id = nonce.to_string();
        self.pending.lock().await.insert(
            id.clone(),
            PendingLeg::Withdraw {
                expected: amount - WITHDRAW_FEE_USDC,
                baseline,
            },
        );
        Ok(TransferId::new(PROVIDER, id))
    }

    async fn deposit_status(&self, amount: f64, since_ms: i64) -> VenueResult<BridgeStatus> {
        let updates = self.venue.ledger_updates(since_ms).await?;
        let mut claimed = self.claimed.lock().await;
        for update in updates {
            if update.delta.kind != "deposit" || claimed.contains(&update.hash) {
                continue;
            }
            let Some(usdc) = update.delta.usdc.as_deref() else {
                continue;
            };
            let credited = parse_wire(usdc)?;
            if (credited - amount).abs() <= AMOUNT_TOLERANCE {
                claimed.insert(update.hash);
                return Ok(BridgeStatus::Settled {
                    amount_received: credited,
                });
            }
        }
        Ok(BridgeStatus::Pending)
    }

    async fn withdraw_status(&self, expected: f64, baseline: f64) -> VenueResult<BridgeStatus> {
        let balance = self
            .chains
            .get(Chain::Arbitrum)?
            .token_balance(COLLATERAL)
            .await?;
        if balance + AMOUNT_TOLERANCE >= baseline + expected {
            Ok(BridgeStatus::Settled {
                amount_received: expected,
            })
        } else {
            Ok(BridgeStatus::Pending)
        }
    }
}

#[async_trait]
impl BridgeProvider for HyperliquidBridge {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, source: Chain, dest: Chain) -> bool {
        matches!(
            (source, dest),
            (Chain::Arbitrum, Chain::Hyperliquid) | (Chain::Hyperliquid, Chain::Arbitrum)
        )
    }

    async fn bridge(&self, token: &str, amount: f64, source: Chain, dest: Chain) -> VenueResult<TransferId> {
        if token != COLLATERAL {
            return Err(VenueError::Unsupported(format!("hyperliquid bridge only moves {}", COLLATERAL)));
        }
        match (source, dest) {
            (Chain::Arbitrum, Chain::Hyperliquid) => self.deposit(amount).await,
            (Chain::Hyperliquid, Chain::Arbitrum) => self.withdraw(amount).await,
            _ => Err(VenueError::Unsupported(format!("hyperliquid bridge {} -> {}", source, dest))),
        }
    }

    async fn status(&self, transfer: &TransferId) -> VenueResult<BridgeStatus> {
        let leg = self
            .pending
            .lock()
            .await
            .get(&transfer.id)
            .cloned()
            .ok_or_else(|| VenueError::InvalidResponse(format!("unknown transfer {}", transfer)))?;

        let status = match leg {
            PendingLeg::Deposit { amount, since_ms } => self.deposit_status(amount, since_ms).await?,
            PendingLeg::Withdraw { expected, baseline } => self.withdraw_status(expected, baseline).await?,
        };
        if !matches!(status, BridgeStatus::Pending) {
            tracing::info!(transfer = %transfer, status = ?status, "[HYPERLIQUID] Bridge transfer settled");
            self.pending.lock().await.remove(&transfer.id);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::chain::EvmChain;
    use crate::adapters::hyperliquid::HyperliquidConfig;
    use mockito::Matcher;
    use serde_json::json;
    use std::collections::BTreeMap;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe512961708279f1d8b1f8e2a2f5b7a1";
    const USER: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";

    fn bridge(url: &str) -> HyperliquidBridge {
        let venue = HyperliquidAdapter::new(HyperliquidConfig::new(Some(url.to_string()), false, KEY, USER)).unwrap();
        let mut chains = EvmChains::new();
        chains.insert(EvmChain::new(Chain::Arbitrum, "http://127.0.0.1:1", KEY, &BTreeMap::new()).unwrap());
        HyperliquidBridge::new(Arc::new(venue), Arc::new(chains))
    }

    #[test]
    fn test_supported_routes() {
        let b = bridge("http://127.0.0.1:1");
        assert!(b.supports(Chain::Arbitrum, Chain::Hyperliquid));
        assert!(b.supports(Chain::Hyperliquid, Chain::Arbitrum));
        assert!(!b.supports(Chain::Unichain, Chain::Hyperliquid));
    }

    #[tokio::test]
    async fn test_small_amounts_rejected() {
        let b = bridge("http://127.0.0.1:1");
        let err = b.bridge("USDC", 4.0, Chain::Arbitrum, Chain::Hyperliquid).await.unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
        let err = b.bridge("USDC", 0.5, Chain::Hyperliquid, Chain::Arbitrum).await.unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
        let err = b.bridge("WETH", 100.0, Chain::Arbitrum, Chain::Hyperliquid).await.unwrap_err();
        assert!(matches!(err, VenueError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_deposit_settles_from_ledger_once() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/info")
            .match_body(Matcher::PartialJson(json!({"type": "userNonFundingLedgerUpdates", "user": USER})))
            .with_status(200)
            .with_body(
                r#"[{"time":1700000000000,"hash":"0xaaa","delta":{"type":"withdraw","usdc":"500.0","nonce":1,"fee":"1.0"}},
                    {"time":1700000100000,"hash":"0xbbb","delta":{"type":"deposit","usdc":"500.0"}}]"#,
            )
            .create_async()
            .await;

        let b = bridge(&server.url());
        for id in ["0x01", "0x02"] {
            b.pending.lock().await.insert(
                id.to_string(),
                PendingLeg::Deposit {
                    amount: 500.0,
                    since_ms: 1_699_999_000_000,
                },
            );
        }

        let first = b.status(&TransferId::new(PROVIDER, "0x01")).await.unwrap();
        assert_eq!(first, BridgeStatus::Settled { amount_received: 500.0 });
        // the same ledger entry cannot settle a second deposit
        let second = b.status(&TransferId::new(PROVIDER, "0x02")).await.unwrap();
        assert_eq!(second, BridgeStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_transfer_is_error() {
        let b = bridge("http://127.0.0.1:1");
        assert!(b.status(&TransferId::new(PROVIDER, "42")).await.is_err());
    }
}
