//! Spot swap service client
//!
//! The spot leg is executed by a sidecar service that finds the best pool on
//! the spot chain, builds the swap and submits it from the strategy wallet.
//! This client speaks its small REST API:
//!
//! - `GET  /health`
//! - `POST /quote` `{sell_token, buy_token, sell_amount}`
//! - `POST /swap`  `{sell_token, buy_token, sell_amount, min_amount_out}`
//!
//! Tokens go over the wire as addresses, amounts as decimal strings in
//! human units.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::SwapVenue;
use crate::adapters::types::{create_http_client, Chain, SwapFill, SwapQuote};

/// Address the swap service uses for the native currency
pub const NATIVE_TOKEN_ADDRESS: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Decimal places sent for amounts
const AMOUNT_DP: u32 = 18;

#[derive(Debug, Serialize)]
struct QuoteRequest<'a> {
    sell_token: &'a str,
    buy_token: &'a str,
    sell_amount: String,
}

#[derive(Debug, Serialize)]
struct SwapRequest<'a> {
    sell_token: &'a str,
    buy_token: &'a str,
    sell_amount: String,
    min_amount_out: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    amount_out: String,
    price: f64,
    #[serde(default)]
    pool_address: Option<String>,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    gas_estimate: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    tx_hash: String,
    amount_out: String,
    #[serde(default)]
    gas_used: Option<u64>,
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Format a human-unit amount as a plain decimal string
pub fn decimal_string(amount: f64) -> VenueResult<String> {
    // Display gives the shortest round-tripping representation, never an exponent
    let value: Decimal = amount
        .to_string()
        .parse()
        .map_err(|_| VenueError::InvalidResponse(format!("amount not representable: {}", amount)))?;
    Ok(value.round_dp(AMOUNT_DP).normalize().to_string())
}

fn parse_amount(raw: &str) -> VenueResult<f64> {
    raw.parse::<Decimal>()
        .ok()
        .and_then(|d| d.to_f64())
        .ok_or_else(|| VenueError::InvalidResponse(format!("bad amount '{}'", raw)))
}

pub struct SwapServiceClient {
    http_client: reqwest::Client,
    base_url: String,
    chain: Chain,
    /// Symbol -> token address on `chain`
    tokens: BTreeMap<String, String>,
    native_symbol: String,
}

impl SwapServiceClient {
    pub fn new(
        base_url: &str,
        chain: Chain,
        tokens: BTreeMap<String, String>,
        native_symbol: &str,
    ) -> Self {
        Self {
            http_client: create_http_client("swap-service"),
            base_url: base_url.trim_end_matches('/').to_string(),
            chain,
            tokens,
            native_symbol: native_symbol.to_string(),
        }
    }

    fn address(&self, symbol: &str) -> VenueResult<&str> {
        if symbol == self.native_symbol {
            return Ok(NATIVE_TOKEN_ADDRESS);
        }
        self.tokens
            .get(symbol)
            .map(|s| s.as_str())
            .ok_or_else(|| VenueError::Unsupported(format!("unknown token {} on {}", symbol, self.chain)))
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> VenueResult<R> {
        let url = format!("{}{}", self.base_url, path);
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

        if status.is_server_error() {
            return Err(VenueError::Unhealthy(format!("{} ({}): {}", path, status, text)));
        }
        if !status.is_success() {
            return Err(VenueError::Rejected(format!("{} ({}): {}", path, status, text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| VenueError::InvalidResponse(format!("Invalid JSON: {} - {}", e, text)))
    }
}

#[async_trait]
impl SwapVenue for SwapServiceClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn health(&self) -> VenueResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| VenueError::Unhealthy(format!("health check failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(VenueError::Unhealthy(format!("health returned {}", response.status())));
        }
        Ok(())
    }

    async fn quote(
        &self,
        sell_token: &str,
        buy_token: &str,
        sell_amount: f64,
    ) -> VenueResult<SwapQuote> {
        let request = QuoteRequest {
            sell_token: self.address(sell_token)?,
            buy_token: self.address(buy_token)?,
            sell_amount: decimal_string(sell_amount)?,
        };
        let quote: QuoteResponse = self.post("/quote", &request).await?;
        let amount_out = parse_amount(&quote.amount_out)?;
        tracing::debug!(
            sell = %sell_token,
            buy = %buy_token,
            sell_amount,
            amount_out,
            protocol = ?quote.protocol,
            "[SWAP] Quote received"
        );
        Ok(SwapQuote {
            sell_token: sell_token.to_string(),
            buy_token: buy_token.to_string(),
            sell_amount,
            amount_out,
            price: quote.price,
            pool_address: quote.pool_address,
            protocol: quote.protocol,
            gas_estimate: quote.gas_estimate,
        })
    }

    async fn execute_swap(&self, quote: &SwapQuote, min_amount_out: f64) -> VenueResult<SwapFill> {
        let request = SwapRequest {
            sell_token: self.address(&quote.sell_token)?,
            buy_token: self.address(&quote.buy_token)?,
            sell_amount: decimal_string(quote.sell_amount)?,
            min_amount_out: decimal_string(min_amount_out)?,
        };
        let result: SwapResponse = self.post("/swap", &request).await?;
        if !result.success {
            return Err(VenueError::Reverted(format!(
                "swap {} failed: {}",
                result.tx_hash,
                result.error.unwrap_or_else(|| "unknown".into())
            )));
        }
        let amount_out = parse_amount(&result.amount_out)?;
        tracing::info!(
            tx_hash = %result.tx_hash,
            sell = %quote.sell_token,
            buy = %quote.buy_token,
            amount_out,
            "[SWAP] Swap executed"
        );
        Ok(SwapFill {
            tx_hash: result.tx_hash,
            amount_out,
            gas_used: result.gas_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const USDC: &str = "0x078D782b760474a361dDA0AF3839290b0EF57AD6";
    const WETH: &str = "0x4200000000000000000000000000000000000006";

    fn client(url: &str) -> SwapServiceClient {
        let mut tokens = BTreeMap::new();
        tokens.insert("USDC".to_string(), USDC.to_string());
        tokens.insert("WETH".to_string(), WETH.to_string());
        SwapServiceClient::new(url, Chain::Unichain, tokens, "ETH")
    }

    #[test]
    fn test_decimal_string() {
        assert_eq!(decimal_string(1.5).unwrap(), "1.5");
        assert_eq!(decimal_string(2000.0).unwrap(), "2000");
        assert!(decimal_string(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        let ok = server.mock("GET", "/health").with_status(200).create_async().await;
        assert!(client(&server.url()).health().await.is_ok());
        ok.assert_async().await;

        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/health").with_status(503).create_async().await;
        let err = client(&server.url()).health().await.unwrap_err();
        assert!(matches!(err, VenueError::Unhealthy(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_quote_sends_addresses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/quote")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "sell_token": USDC,
                "buy_token": WETH,
                "sell_amount": "1000"
            })))
            .with_status(200)
            .with_body(r#"{"amount_out":"0.5","price":0.0005,"pool_address":"0xpool","protocol":"uniswap_v4","gas_estimate":180000}"#)
            .create_async()
            .await;

        let quote = client(&server.url()).quote("USDC", "WETH", 1000.0).await.unwrap();
        mock.assert_async().await;
        assert_eq!(quote.amount_out, 0.5);
        assert_eq!(quote.sell_token, "USDC");
        assert_eq!(quote.protocol.as_deref(), Some("uniswap_v4"));
    }

    #[tokio::test]
    async fn test_native_symbol_maps_to_placeholder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/quote")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "buy_token": NATIVE_TOKEN_ADDRESS
            })))
            .with_status(200)
            .with_body(r#"{"amount_out":"0.01","price":0.0005}"#)
            .create_async()
            .await;
        let quote = client(&server.url()).quote("USDC", "ETH", 20.0).await.unwrap();
        assert_eq!(quote.amount_out, 0.01);
    }

    #[tokio::test]
    async fn test_unknown_token_is_unsupported() {
        let err = client("http://127.0.0.1:1").quote("DOGE", "USDC", 1.0).await.unwrap_err();
        assert!(matches!(err, VenueError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_swap_failure_is_reverted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/swap")
            .match_body(Matcher::PartialJson(serde_json::json!({"min_amount_out": "0.495"})))
            .with_status(200)
            .with_body(r#"{"tx_hash":"0xabc","amount_out":"0","success":false,"error":"slippage"}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        let quote = SwapQuote {
            sell_token: "USDC".into(),
            buy_token: "WETH".into(),
            sell_amount: 1000.0,
            amount_out: 0.5,
            price: 0.0005,
            pool_address: None,
            protocol: None,
            gas_estimate: None,
        };
        let err = c.execute_swap(&quote, 0.495).await.unwrap_err();
        assert!(matches!(err, VenueError::Reverted(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_swap_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/swap")
            .with_status(200)
            .with_body(r#"{"tx_hash":"0xdef","amount_out":"0.4999","gas_used":150000,"success":true}"#)
            .create_async()
            .await;
        let quote = SwapQuote {
            sell_token: "USDC".into(),
            buy_token: "WETH".into(),
            sell_amount: 1000.0,
            amount_out: 0.5,
            price: 0.0005,
            pool_address: None,
            protocol: None,
            gas_estimate: None,
        };
        let fill = client(&server.url()).execute_swap(&quote, 0.495).await.unwrap();
        assert_eq!(fill.tx_hash, "0xdef");
        assert_eq!(fill.amount_out, 0.4999);
        assert_eq!(fill.gas_used, Some(150000));
    }
}
