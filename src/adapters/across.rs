//! Across bridge between EVM chains
//!
//! Deposits go straight to the origin chain's SpokePool (`depositV3`) using
//! the relay fee and deadlines quoted by the Across API. Settlement is
//! polled through `/deposit/status`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::core::types::{Address, U256};
use serde::{Deserialize, Deserializer};
use tokio::sync::Mutex;

use crate::adapters::chain::{calldata, from_base_units, EvmChains};
use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::BridgeProvider;
use crate::adapters::types::{create_http_client, BridgeStatus, Chain, TransferId};

const DEPOSIT_V3: &str = "depositV3(address,address,address,address,uint256,uint256,uint256,address,uint32,uint32,uint32,bytes)";
const PROVIDER: &str = "across";

#[derive(Debug, Clone)]
pub struct AcrossConfig {
    pub api_url: String,
}

/// Across returns some integers as strings and some as numbers
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayFee {
    pub pct: String,
    pub total: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedFees {
    pub total_relay_fee: RelayFee,
    #[serde(deserialize_with = "de_u64")]
    pub timestamp: u64,
    #[serde(deserialize_with = "de_u64")]
    pub fill_deadline: u64,
    pub exclusive_relayer: String,
    #[serde(deserialize_with = "de_u64")]
    pub exclusivity_deadline: u64,
    pub spoke_pool_address: String,
    #[serde(default)]
    pub is_amount_too_low: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositStatus {
    pub status: String,
    #[serde(default)]
    pub fill_tx: Option<String>,
}

/// Across REST API
pub struct AcrossApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl AcrossApi {
    pub fn new(config: &AcrossConfig) -> Self {
        Self {
            http_client: create_http_client("across"),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> VenueResult<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| VenueError::ConnectionFailed(format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
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
            .map(Some)
            .map_err(|e| VenueError::InvalidResponse(format!("Invalid JSON: {} - {}", e, text)))
    }

    pub async fn suggested_fees(
        &self,
        input_token: Address,
        output_token: Address,
        origin_chain_id: u64,
        destination_chain_id: u64,
        amount: U256,
    ) -> VenueResult<SuggestedFees> {
        let query = [
            ("inputToken", format!("{:?}", input_token)),
            ("outputToken", format!("{:?}", output_token)),
            ("originChainId", origin_chain_id.to_string()),
            ("destinationChainId", destination_chain_id.to_string()),
            ("amount", amount.to_string()),
        ];
        self.get("/suggested-fees", &query)
            .await?
            .ok_or_else(|| VenueError::Rejected("no route for suggested fees".to_string()))
    }

    /// `None` while the deposit is not indexed yet
    pub async fn deposit_status(&self, origin_chain_id: u64, tx_hash: &str) -> VenueResult<Option<DepositStatus>> {
        let query = [
            ("originChainId", origin_chain_id.to_string()),
            ("depositTxHash", tx_hash.to_string()),
        ];
        self.get("/deposit/status", &query).await
    }
}

#[derive(Debug, Clone)]
struct PendingDeposit {
    origin: Chain,
    output_amount: f64,
}

pub struct AcrossBridge {
    api: AcrossApi,
    chains: Arc<EvmChains>,
    pending: Mutex<HashMap<String, PendingDeposit>>,
}

impl AcrossBridge {
    pub fn new(config: &AcrossConfig, chains: Arc<EvmChains>) -> Self {
        Self {
            api: AcrossApi::new(config),
            chains,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

fn chain_id(chain: Chain) -> VenueResult<u64> {
    chain
        .chain_id()
        .ok_or_else(|| VenueError::Unsupported(format!("across does not serve {}", chain)))
}

#[async_trait]
impl BridgeProvider for AcrossBridge {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn supports(&self, source: Chain, dest: Chain) -> bool {
        source != dest
            && source.is_evm()
            && dest.is_evm()
            && self.chains.get(source).is_ok()
            && self.chains.get(dest).is_ok()
    }

    async fn bridge(&self, token: &str, amount: f64, source: Chain, dest: Chain) -> VenueResult<TransferId> {
        if !self.supports(source, dest) {
            return Err(VenueError::Unsupported(format!("across {} -> {}", source, dest)));
        }
        let origin = self.chains.get(source)?;
        let destination = self.chains.get(dest)?;
        let input_token = origin.token_address(token)?;
        let output_token = destination.token_address(token)?;
        let input_decimals = origin.decimals(input_token).await?;
        let input_amount = origin.base_units(token, amount).await?;

        let fees = self
            .api
            .suggested_fees(input_token, output_token, chain_id(source)?, chain_id(dest)?, input_amount)
            .await?;
        if fees.is_amount_too_low {
            return Err(VenueError::Rejected(format!("across: {} {} is below the minimum", amount, token)));
        }
        let fee = U256::from_dec_str(&fees.total_relay_fee.total)
            .map_err(|e| VenueError::InvalidResponse(format!("bad relay fee '{}': {}", fees.total_relay_fee.total, e)))?;
        if fee >= input_amount {
            return Err(VenueError::Rejected(format!("across fee {} exceeds amount {}", fee, input_amount)));
        }
        let output_amount = amount - from_base_units(fee, input_decimals)?;
        let output_units = destination.base_units(token, output_amount).await?;

        let spoke_pool: Address = fees
            .spoke_pool_address
            .parse()
            .map_err(|e| VenueError::InvalidResponse(format!("bad spoke pool address: {}", e)))?;
        let relayer: Address = fees
            .exclusive_relayer
            .parse()
            .map_err(|e| VenueError::InvalidResponse(format!("bad exclusive relayer: {}", e)))?;

        origin.ensure_allowance(token, spoke_pool, input_amount).await?;

        let depositor = origin.wallet_address();
        let data = calldata(
            DEPOSIT_V3,
            &[
                Token::Address(depositor),
                Token::Address(depositor),
                Token::Address(input_token),
                Token::Address(output_token),
                Token::Uint(input_amount),
                Token::Uint(output_units),
                Token::Uint(U256::from(chain_id(dest)?)),
                Token::Address(relayer),
                Token::Uint(U256::from(fees.timestamp)),
                Token::Uint(U256::from(fees.fill_deadline)),
                Token::Uint(U256::from(fees.exclusivity_deadline)),
                Token::Bytes(Vec::new()),
            ],
        );
        let tx_hash = origin.send_call(spoke_pool, data, U256::zero(), "depositV3").await?;
        let id = format!("{:?}", tx_hash);

        tracing::info!(
            token = %token,
            amount,
            output_amount,
            source = %source,
            dest = %dest,
            tx_hash = %id,
            "[ACROSS] Deposit submitted"
        );
        self.pending.lock().await.insert(
            id.clone(),
            PendingDeposit {
                origin: source,
                output_amount,
            },
        );
        Ok(TransferId::new(PROVIDER, id))
    }

    async fn status(&self, transfer: &TransferId) -> VenueResult<BridgeStatus> {
        let deposit = self
            .pending
            .lock()
            .await
            .get(&transfer.id)
            .cloned()
            .ok_or_else(|| VenueError::InvalidResponse(format!("unknown transfer {}", transfer)))?;

        let Some(status) = self.api.deposit_status(chain_id(deposit.origin)?, &transfer.id).await? else {
            return Ok(BridgeStatus::Pending);
        };
        let result = match status.status.as_str() {
            "filled" => BridgeStatus::Settled {
                amount_received: deposit.output_amount,
            },
            "expired" | "refunded" => BridgeStatus::Failed(format!("deposit {}", status.status)),
            _ => return Ok(BridgeStatus::Pending),
        };
        tracing::info!(transfer = %transfer, status = %status.status, fill_tx = ?status.fill_tx, "[ACROSS] Deposit resolved");
        self.pending.lock().await.remove(&transfer.id);
        Ok(result)
    }
}
