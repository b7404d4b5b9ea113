//! Hyperliquid REST adapter
//!
//! Reads go to `POST /info`, signed actions to `POST /exchange`. Asset
//! metadata (index, size decimals) is cached after the first
//! `metaAndAssetCtxs` call; mark price and funding are re-read every time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use ethers::signers::{LocalWallet, Signer};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::RwLock;

use super::signing::{sign_l1_action, sign_withdraw, signature_wire, SIGNATURE_CHAIN_ID};
use super::wire::{
    float_to_wire, parse_wire, round_price, round_size, AssetCtx, BulkOrder, ClearinghouseState,
    ExchangeOk, ExchangeResponse, FundingHistoryEntry, L1Action, LedgerUpdate, LimitWire,
    OrderStatusWire, OrderTypeWire, OrderWire, Universe, Withdraw3,
};
use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::PerpVenue;
use crate::adapters::types::{create_http_client, FundingSample, PerpFill, PositionInfo};

pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Connection settings for the perp venue
#[derive(Debug, Clone)]
pub struct HyperliquidConfig {
    pub api_url: String,
    pub testnet: bool,
    pub private_key: String,
    /// Account whose state is queried (the signer's address)
    pub account_address: String,
}

impl HyperliquidConfig {
    pub fn new(
        api_url: Option<String>,
        testnet: bool,
        private_key: &str,
        account_address: &str,
    ) -> Self {
        let default_url = if testnet { TESTNET_API_URL } else { MAINNET_API_URL };
        Self {
            api_url: api_url
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            testnet,
            private_key: private_key.to_string(),
            account_address: account_address.to_lowercase(),
        }
    }

    pub fn is_mainnet(&self) -> bool {
        !self.testnet
    }

    fn chain_label(&self) -> &'static str {
        if self.testnet {
            "Testnet"
        } else {
            "Mainnet"
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AssetInfo {
    index: u32,
    sz_decimals: u32,
}

pub struct HyperliquidAdapter {
    config: HyperliquidConfig,
    http_client: reqwest::Client,
    wallet: LocalWallet,
    assets: RwLock<HashMap<String, AssetInfo>>,
    last_nonce: AtomicU64,
}

impl HyperliquidAdapter {
    pub fn new(config: HyperliquidConfig) -> VenueResult<Self> {
        let wallet: LocalWallet = config
            .private_key
            .parse()
            .map_err(|e| VenueError::Signing(format!("Invalid private key: {}", e)))?;
        let signer = format!("{:?}", wallet.address()).to_lowercase();
        if signer != config.account_address {
            tracing::warn!(
                signer = %signer,
                account = %config.account_address,
                "[HYPERLIQUID] Signer differs from queried account"
            );
        }
        Ok(Self {
            config,
            http_client: create_http_client("hyperliquid"),
            wallet,
            assets: RwLock::new(HashMap::new()),
            last_nonce: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &HyperliquidConfig {
        &self.config
    }

    /// Millisecond nonce, strictly increasing per process
    fn next_nonce(&self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last_nonce.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_nonce
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> VenueResult<T> {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| VenueError::ConnectionFailed(format!("POST {} failed: {}", path, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VenueError::InvalidResponse(format!("Failed to read response: {}", e)))?;

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(VenueError::Unhealthy(format!("{} ({}): {}", path, status, text)));
        }
        if !status.is_success() {
            return Err(VenueError::Rejected(format!("{} ({}): {}", path, status, text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| VenueError::InvalidResponse(format!("Invalid JSON from {}: {} - {}", path, e, text)))
    }

    async fn info<T: DeserializeOwned>(&self, body: serde_json::Value) -> VenueResult<T> {
        self.post("/info", &body).await
    }

    async fn exchange(
        &self,
        action: serde_json::Value,
        signature: serde_json::Value,
        nonce: u64,
    ) -> VenueResult<ExchangeOk> {
        let body = json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": null,
        });
        match self.post::<ExchangeResponse>("/exchange", &body).await? {
            ExchangeResponse::Ok(ok) => Ok(ok),
            ExchangeResponse::Err(msg) => Err(VenueError::Rejected(msg)),
        }
    }

    async fn clearinghouse_state(&self) -> VenueResult<ClearinghouseState> {
        self.info(json!({
            "type": "clearinghouseState",
            "user": self.config.account_address,
        }))
        .await
    }

    /// Asset metadata plus the current context (mark, funding) for `asset`
    async fn asset_context(&self, asset: &str) -> VenueResult<(AssetInfo, AssetCtx)> {
        let (universe, ctxs): (Universe, Vec<AssetCtx>) =
            self.info(json!({"type": "metaAndAssetCtxs"})).await?;

        let mut found = None;
        {
            let mut assets = self.assets.write().await;
            for (index, meta) in universe.universe.into_iter().enumerate() {
                let info = AssetInfo {
                    index: index as u32,
                    sz_decimals: meta.sz_decimals,
                };
                if meta.name == asset {
                    found = Some(info);
                }
                assets.insert(meta.name, info);
            }
        }

        let info = found.ok_or_else(|| {
            VenueError::Unsupported(format!("asset {} not listed on hyperliquid", asset))
        })?;
        let ctx = ctxs.into_iter().nth(info.index as usize).ok_or_else(|| {
            VenueError::InvalidResponse(format!("no asset context for {}", asset))
        })?;
        Ok((info, ctx))
    }

    /// USDC withdrawal to `destination` on Arbitrum; returns the action nonce
    pub async fn withdraw(&self, destination: &str, amount: f64) -> VenueResult<u64> {
        let nonce = self.next_nonce();
        let withdraw = Withdraw3 {
            hyperliquid_chain: self.config.chain_label().to_string(),
            signature_chain_id: format!("{:#x}", SIGNATURE_CHAIN_ID),
            destination: destination.to_lowercase(),
            amount: float_to_wire(amount)?,
            time: nonce,
        };
        let signature = signature_wire(&sign_withdraw(&self.wallet, &withdraw)?);

        let mut action = serde_json::to_value(&withdraw)
            .map_err(|e| VenueError::Signing(format!("withdraw encoding failed: {}", e)))?;
        if let Some(map) = action.as_object_mut() {
            map.insert("type".to_string(), json!("withdraw3"));
        }
        let signature = serde_json::to_value(signature)
            .map_err(|e| VenueError::Signing(format!("signature encoding failed: {}", e)))?;

        self.exchange(action, signature, nonce).await?;
        tracing::info!(
            amount,
            destination = %destination,
            nonce,
            "[HYPERLIQUID] Withdrawal submitted"
        );
        Ok(nonce)
    }

    /// Deposits, withdrawals and transfers since `start_ms`
    pub async fn ledger_updates(&self, start_ms: i64) -> VenueResult<Vec<LedgerUpdate>> {
        self.info(json!({
            "type": "userNonFundingLedgerUpdates",
            "user": self.config.account_address,
            "startTime": start_ms,
        }))
        .await
    }

    async fn place_ioc(&self, order: OrderWire) -> VenueResult<OrderStatusWire> {
        let nonce = self.next_nonce();
        let action = L1Action::Order(BulkOrder {
            orders: vec![order],
            grouping: "na".to_string(),
        });
        let sig = sign_l1_action(&self.wallet, &action, nonce, self.config.is_mainnet())?;

        let action = serde_json::to_value(&action)
            .map_err(|e| VenueError::Signing(format!("order encoding failed: {}", e)))?;
        let signature = serde_json::to_value(signature_wire(&sig))
            .map_err(|e| VenueError::Signing(format!("signature encoding failed: {}", e)))?;

        let ok = self.exchange(action, signature, nonce).await?;
        ok.data
            .and_then(|d| d.statuses.into_iter().next())
            .ok_or_else(|| VenueError::InvalidResponse(format!("order response without status ({})", ok.kind)))
    }
}

#[async_trait]
impl PerpVenue for HyperliquidAdapter {
    fn venue_name(&self) -> &'static str {
        "hyperliquid"
    }

    async fn account_value(&self) -> VenueResult<f64> {
        let state = self.clearinghouse_state().await?;
        parse_wire(&state.margin_summary.account_value)
    }

    async fn position(&self, asset: &str) -> VenueResult<PositionInfo> {
        let state = self.clearinghouse_state().await?;
        let Some(p) = state
            .asset_positions
            .into_iter()
            .map(|ap| ap.position)
            .find(|p| p.coin == asset)
        else {
            return Ok(PositionInfo::flat(asset));
        };
        Ok(PositionInfo {
            asset: asset.to_string(),
            size: parse_wire(&p.szi)?,
            entry_price: p.entry_px.as_deref().map(parse_wire).transpose()?.unwrap_or(0.0),
            liquidation_price: p.liquidation_px.as_deref().map(parse_wire).transpose()?,
        })
    }

    async fn mark_price(&self, asset: &str) -> VenueResult<f64> {
        let (_, ctx) = self.asset_context(asset).await?;
        let raw = ctx
            .mark_px
            .ok_or_else(|| VenueError::InvalidResponse(format!("no mark price for {}", asset)))?;
        parse_wire(&raw)
    }

    async fn funding_rate(&self, asset: &str) -> VenueResult<f64> {
        let (_, ctx) = self.asset_context(asset).await?;
        parse_wire(&ctx.funding)
    }

    async fn funding_history(
        &self,
        asset: &str,
        window: Duration,
    ) -> VenueResult<Vec<FundingSample>> {
        let end = Utc::now();
        let start = end - window;
        let entries: Vec<FundingHistoryEntry> = self
            .info(json!({
                "type": "fundingHistory",
                "coin": asset,
                "startTime": start.timestamp_millis(),
                "endTime": end.timestamp_millis(),
            }))
            .await?;

        entries
            .into_iter()
            .filter(|e| e.coin == asset)
            .map(|e| {
                let timestamp = Utc.timestamp_millis_opt(e.time).single().ok_or_else(|| {
                    VenueError::InvalidResponse(format!("bad funding timestamp {}", e.time))
                })?;
                Ok(FundingSample {
                    timestamp,
                    rate: parse_wire(&e.funding_rate)?,
                })
            })
            .collect()
    }

    async fn adjust_position(
        &self,
        asset: &str,
        target_size: f64,
        max_slippage: f64,
    ) -> VenueResult<PerpFill> {
        let current = self.position(asset).await?.size;
        let (info, ctx) = self.asset_context(asset).await?;
        let delta = round_size(target_size - current, info.sz_decimals)?;
        if delta == 0.0 {
            tracing::debug!(asset = %asset, current, target_size, "[HYPERLIQUID] Position already at target");
            return Ok(PerpFill {
                asset: asset.to_string(),
                filled_size: 0.0,
                avg_price: None,
            });
        }

        let mark = parse_wire(ctx.mark_px.as_deref().unwrap_or_default())?;
        let is_buy = delta > 0.0;
        let limit = if is_buy {
            mark * (1.0 + max_slippage)
        } else {
            mark * (1.0 - max_slippage)
        };
        let shrinking = target_size.abs() < current.abs() && target_size * current >= 0.0;

        let order = OrderWire {
            asset: info.index,
            is_buy,
            limit_px: float_to_wire(round_price(limit, info.sz_decimals)?)?,
            sz: float_to_wire(delta.abs())?,
            reduce_only: shrinking,
            order_type: OrderTypeWire::Limit(LimitWire { tif: "Ioc".to_string() }),
            cloid: None,
        };
        tracing::info!(
            asset = %asset,
            current,
            target_size,
            is_buy,
            sz = %order.sz,
            limit_px = %order.limit_px,
            reduce_only = shrinking,
            "[HYPERLIQUID] Placing IOC order"
        );

        match self.place_ioc(order).await? {
            OrderStatusWire::Filled(fill) => {
                let filled = parse_wire(&fill.total_sz)?;
                let avg_price = parse_wire(&fill.avg_px)?;
                if filled + 1e-12 < delta.abs() {
                    tracing::warn!(
                        asset = %asset,
                        requested = delta.abs(),
                        filled,
                        "[HYPERLIQUID] Partial fill"
                    );
                }
                tracing::info!(asset = %asset, filled, avg_price, oid = fill.oid, "[HYPERLIQUID] Order filled");
                Ok(PerpFill {
                    asset: asset.to_string(),
                    filled_size: if is_buy { filled } else { -filled },
                    avg_price: Some(avg_price),
                })
            }
            OrderStatusWire::Error(msg) => Err(VenueError::Rejected(msg)),
            OrderStatusWire::Resting(r) => Err(VenueError::InvalidResponse(format!(
                "IOC order {} rested on the book",
                r.oid
            ))),
        }
    }
}
