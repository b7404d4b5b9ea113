//! Hyperliquid wire types and number formatting
//!
//! Prices sent to the venue carry at most 5 significant figures and at most
//! `6 - szDecimals` decimals (integer prices are always accepted). Sizes are
//! rounded to `szDecimals`. Numbers travel as strings without trailing zeros.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::adapters::errors::{VenueError, VenueResult};

/// Max decimals for perp prices before subtracting szDecimals
const MAX_PERP_DECIMALS: u32 = 6;
/// Significant figures allowed in a price
const PRICE_SIG_FIGS: i32 = 5;

fn to_decimal(value: f64) -> VenueResult<Decimal> {
    value
        .to_string()
        .parse()
        .map_err(|_| VenueError::InvalidResponse(format!("not a finite number: {}", value)))
}

/// Round a perp limit price to what the venue accepts
pub fn round_price(px: f64, sz_decimals: u32) -> VenueResult<f64> {
    let d = to_decimal(px)?;
    if d.is_zero() || d.fract().is_zero() {
        return Ok(px);
    }
    let magnitude = px.abs().log10().floor() as i32;
    let sig_dp = (PRICE_SIG_FIGS - 1 - magnitude).max(0) as u32;
    let max_dp = MAX_PERP_DECIMALS.saturating_sub(sz_decimals);
    let dp = sig_dp.min(max_dp);
    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .ok_or_else(|| VenueError::InvalidResponse(format!("price out of range: {}", px)))
}

/// Round an order size to the asset's size decimals
pub fn round_size(sz: f64, sz_decimals: u32) -> VenueResult<f64> {
    to_decimal(sz)?
        .round_dp_with_strategy(sz_decimals, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .ok_or_else(|| VenueError::InvalidResponse(format!("size out of range: {}", sz)))
}

/// Venue string form: at most 8 decimals, no trailing zeros
pub fn float_to_wire(value: f64) -> VenueResult<String> {
    let d = to_decimal(value)?.round_dp(8).normalize();
    if d.is_zero() {
        return Ok("0".to_string());
    }
    Ok(d.to_string())
}

/// Parse a venue decimal string
pub fn parse_wire(raw: &str) -> VenueResult<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| VenueError::InvalidResponse(format!("bad number '{}'", raw)))
}

// =============================================================================
// Exchange actions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitWire {
    pub tif: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderTypeWire {
    Limit(LimitWire),
}

/// Single order, field names as the venue hashes them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "b")]
    pub is_buy: bool,
    #[serde(rename = "p")]
    pub limit_px: String,
    #[serde(rename = "s")]
    pub sz: String,
    #[serde(rename = "r")]
    pub reduce_only: bool,
    #[serde(rename = "t")]
    pub order_type: OrderTypeWire,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub cloid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOrder {
    pub orders: Vec<OrderWire>,
    pub grouping: String,
}

/// L1 actions signed through the phantom agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum L1Action {
    Order(BulkOrder),
}

/// User-signed withdrawal to Arbitrum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdraw3 {
    pub hyperliquid_chain: String,
    pub signature_chain_id: String,
    pub destination: String,
    pub amount: String,
    pub time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureWire {
    pub r: String,
    pub s: String,
    pub v: u64,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", content = "response", rename_all = "lowercase")]
pub enum ExchangeResponse {
    Ok(ExchangeOk),
    Err(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeOk {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<OrderData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderData {
    pub statuses: Vec<OrderStatusWire>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatusWire {
    Filled(FilledWire),
    Resting(RestingWire),
    Error(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilledWire {
    pub total_sz: String,
    pub avg_px: String,
    pub oid: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestingWire {
    pub oid: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummary,
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
    #[serde(default)]
    pub withdrawable: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    pub position: PositionWire,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionWire {
    pub coin: String,
    pub szi: String,
    #[serde(default)]
    pub entry_px: Option<String>,
    #[serde(default)]
    pub liquidation_px: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Universe {
    pub universe: Vec<AssetMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    pub funding: String,
    #[serde(default)]
    pub mark_px: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingHistoryEntry {
    pub coin: String,
    pub funding_rate: String,
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerUpdate {
    pub time: i64,
    pub hash: String,
    pub delta: LedgerDelta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerDelta {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub usdc: Option<String>,
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub fee: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_price_significant_figures() {
        assert_eq!(round_price(2000.123456, 4).unwrap(), 2000.1);
        assert_eq!(round_price(1234.56, 2).unwrap(), 1234.6);
        assert_eq!(round_price(98765.4321, 1).unwrap(), 98765.0);
    }

    #[test]
    fn test_round_price_decimal_cap() {
        // 5 significant figures would allow 7 decimals, szDecimals=0 caps at 6
        assert_eq!(round_price(0.00123456, 0).unwrap(), 0.001235);
        // szDecimals=4 caps at 2 decimals
        assert_eq!(round_price(3.14159, 4).unwrap(), 3.14);
    }

    #[test]
    fn test_integer_prices_pass_through() {
        assert_eq!(round_price(123456.0, 2).unwrap(), 123456.0);
        assert_eq!(round_price(2000.0, 4).unwrap(), 2000.0);
    }

    #[test]
    fn test_round_size() {
        assert_eq!(round_size(1.23456, 4).unwrap(), 1.2346);
        assert_eq!(round_size(-0.00004, 4).unwrap(), -0.0);
    }

    #[test]
    fn test_float_to_wire() {
        assert_eq!(float_to_wire(1891.4).unwrap(), "1891.4");
        assert_eq!(float_to_wire(0.02).unwrap(), "0.02");
        assert_eq!(float_to_wire(100.0).unwrap(), "100");
        assert_eq!(float_to_wire(-0.0).unwrap(), "0");
        assert!(float_to_wire(f64::INFINITY).is_err());
    }

    #[test]
    fn test_order_wire_json_shape() {
        let action = L1Action::Order(BulkOrder {
            orders: vec![OrderWire {
                asset: 4,
                is_buy: false,
                limit_px: "1980".into(),
                sz: "1.5".into(),
                reduce_only: false,
                order_type: OrderTypeWire::Limit(LimitWire { tif: "Ioc".into() }),
                cloid: None,
            }],
            grouping: "na".into(),
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["orders"][0]["a"], 4);
        assert_eq!(json["orders"][0]["t"]["limit"]["tif"], "Ioc");
        assert!(json["orders"][0].get("c").is_none());
    }

    #[test]
    fn test_exchange_response_variants() {
        let ok: ExchangeResponse = serde_json::from_str(
            r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"filled":{"totalSz":"0.02","avgPx":"1891.4","oid":77738308}}]}}}"#,
        )
        .unwrap();
        match ok {
            ExchangeResponse::Ok(ExchangeOk { data: Some(data), .. }) => {
                assert!(matches!(&data.statuses[0], OrderStatusWire::Filled(f) if f.total_sz == "0.02"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let rejected: ExchangeResponse = serde_json::from_str(
            r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"error":"Order could not immediately match against any resting orders."}]}}}"#,
        )
        .unwrap();
        assert!(matches!(rejected, ExchangeResponse::Ok(_)));

        let err: ExchangeResponse =
            serde_json::from_str(r#"{"status":"err","response":"User does not exist."}"#).unwrap();
        assert!(matches!(err, ExchangeResponse::Err(m) if m.contains("does not exist")));
    }
}
