//! EVM chain access for the strategy wallet
//!
//! Balance reads, ERC20 transfers/approvals and raw contract calls over
//! JSON-RPC. Calldata is built by hand (4-byte selector + ABI-encoded
//! arguments) so no contract bindings are generated.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::core::types::{Address, Bytes, TransactionRequest, H256, U256, U64};
use ethers::core::utils::{format_units, keccak256, parse_units};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::Mutex;

use crate::adapters::errors::{VenueError, VenueResult};
use crate::adapters::traits::{BalanceSource, NativeWrapper};
use crate::adapters::types::{Chain, NATIVE};

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// How long to wait for a receipt before handing back the bare hash
const RECEIPT_TIMEOUT_SECS: u64 = 120;
const NATIVE_DECIMALS: u8 = 18;

/// First four bytes of keccak256 of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Selector followed by the ABI-encoded arguments
pub fn calldata(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode(args));
    data
}

/// Human amount to base units, truncating beyond `decimals`
pub fn to_base_units(amount: f64, decimals: u8) -> VenueResult<U256> {
    if !(amount.is_finite() && amount >= 0.0) {
        return Err(VenueError::InvalidResponse(format!("invalid token amount {}", amount)));
    }
    let d: Decimal = amount
        .to_string()
        .parse()
        .map_err(|_| VenueError::InvalidResponse(format!("amount not representable: {}", amount)))?;
    let d = d
        .round_dp_with_strategy(decimals as u32, RoundingStrategy::ToZero)
        .normalize();
    let units = parse_units(d.to_string(), decimals as u32)
        .map_err(|e| VenueError::InvalidResponse(format!("cannot convert {}: {}", amount, e)))?;
    Ok(units.into())
}

pub fn from_base_units(value: U256, decimals: u8) -> VenueResult<f64> {
    format_units(value, decimals as u32)
        .map_err(|e| VenueError::InvalidResponse(format!("cannot format {}: {}", value, e)))?
        .parse::<f64>()
        .map_err(|e| VenueError::InvalidResponse(format!("cannot parse units: {}", e)))
}

fn rpc_err(context: &str, e: impl std::fmt::Display) -> VenueError {
    VenueError::Rpc(format!("{}: {}", context, e))
}

fn word(result: &Bytes, context: &str) -> VenueResult<U256> {
    if result.len() < 32 {
        return Err(VenueError::InvalidResponse(format!(
            "{} returned {} bytes, expected 32",
            context,
            result.len()
        )));
    }
    Ok(U256::from_big_endian(&result[..32]))
}

/// The strategy wallet on one EVM chain
pub struct EvmChain {
    chain: Chain,
    client: Arc<Client>,
    tokens: BTreeMap<String, Address>,
    decimals: Mutex<HashMap<Address, u8>>,
}

impl EvmChain {
    /// `tokens` maps symbol to ERC20 address on this chain
    pub fn new(
        chain: Chain,
        rpc_url: &str,
        private_key: &str,
        tokens: &BTreeMap<String, String>,
    ) -> VenueResult<Self> {
        let chain_id = chain
            .chain_id()
            .ok_or_else(|| VenueError::Unsupported(format!("{} is not an EVM chain", chain)))?;
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| VenueError::ConnectionFailed(format!("bad RPC url for {}: {}", chain, e)))?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| VenueError::Signing(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        let mut parsed = BTreeMap::new();
        for (symbol, address) in tokens {
            let address: Address = address.parse().map_err(|e| {
                VenueError::InvalidResponse(format!("bad {} address on {}: {}", symbol, chain, e))
            })?;
            parsed.insert(symbol.clone(), address);
        }

        Ok(Self {
            chain,
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            tokens: parsed,
            decimals: Mutex::new(HashMap::new()),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn wallet_address(&self) -> Address {
        self.client.address()
    }

    pub fn token_address(&self, symbol: &str) -> VenueResult<Address> {
        self.tokens
            .get(symbol)
            .copied()
            .ok_or_else(|| VenueError::Unsupported(format!("unknown token {} on {}", symbol, self.chain)))
    }

    async fn call(&self, to: Address, data: Vec<u8>, context: &str) -> VenueResult<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data);
        self.client
            .call(&tx.into(), None)
            .await
            .map_err(|e| rpc_err(context, e))
    }

    pub async fn decimals(&self, token: Address) -> VenueResult<u8> {
        if let Some(d) = self.decimals.lock().await.get(&token) {
            return Ok(*d);
        }
        let result = self.call(token, calldata("decimals()", &[]), "decimals").await?;
        let decimals = word(&result, "decimals")?.low_u32() as u8;
        self.decimals.lock().await.insert(token, decimals);
        Ok(decimals)
    }

    pub async fn native_balance(&self) -> VenueResult<f64> {
        let wei = self
            .client
            .get_balance(self.wallet_address(), None)
            .await
            .map_err(|e| rpc_err("eth_getBalance", e))?;
        from_base_units(wei, NATIVE_DECIMALS)
    }

    pub async fn token_balance(&self, symbol: &str) -> VenueResult<f64> {
        let token = self.token_address(symbol)?;
        let decimals = self.decimals(token).await?;
        let data = calldata("balanceOf(address)", &[Token::Address(self.wallet_address())]);
        let raw = word(&self.call(token, data, "balanceOf").await?, "balanceOf")?;
        from_base_units(raw, decimals)
    }

    /// Human amount of `symbol` in the token's base units
    pub async fn base_units(&self, symbol: &str, amount: f64) -> VenueResult<U256> {
        let token = self.token_address(symbol)?;
        to_base_units(amount, self.decimals(token).await?)
    }

    /// Approve `spender` for at least `amount` base units
    pub async fn ensure_allowance(&self, symbol: &str, spender: Address, amount: U256) -> VenueResult<()> {
        let token = self.token_address(symbol)?;
        let data = calldata(
            "allowance(address,address)",
            &[Token::Address(self.wallet_address()), Token::Address(spender)],
        );
        let current = word(&self.call(token, data, "allowance").await?, "allowance")?;
        if current >= amount {
            return Ok(());
        }
        let data = calldata("approve(address,uint256)", &[Token::Address(spender), Token::Uint(amount)]);
        self.send_call(token, data, U256::zero(), "approve").await?;
        Ok(())
    }

    /// ERC20 transfer of a human `amount`
    pub async fn transfer(&self, symbol: &str, to: Address, amount: f64) -> VenueResult<H256> {
        let token = self.token_address(symbol)?;
        let units = self.base_units(symbol, amount).await?;
        let data = calldata("transfer(address,uint256)", &[Token::Address(to), Token::Uint(units)]);
        self.send_call(token, data, U256::zero(), "transfer").await
    }

    /// `deposit()` on the wrapped-native contract
    pub async fn wrap_native(&self, wrapped: &str, amount: f64) -> VenueResult<H256> {
        let token = self.token_address(wrapped)?;
        let value = to_base_units(amount, NATIVE_DECIMALS)?;
        self.send_call(token, calldata("deposit()", &[]), value, "wrap").await
    }

    /// `withdraw(uint256)` on the wrapped-native contract
    pub async fn unwrap_native(&self, wrapped: &str, amount: f64) -> VenueResult<H256> {
        let token = self.token_address(wrapped)?;
        let units = to_base_units(amount, NATIVE_DECIMALS)?;
        let data = calldata("withdraw(uint256)", &[Token::Uint(units)]);
        self.send_call(token, data, U256::zero(), "unwrap").await
    }

    /// Sign, send and wait for a contract call
    ///
    /// A mined-but-reverted transaction is an error. If no receipt arrives
    /// in time the hash is returned; the caller's settlement polling decides.
    pub async fn send_call(&self, to: Address, data: Vec<u8>, value: U256, label: &str) -> VenueResult<H256> {
        let tx = TransactionRequest::new()
            .to(to)
            .data(data)
            .value(value)
            .from(self.wallet_address());

        let gas_estimate = self
            .client
            .estimate_gas(&tx.clone().into(), None)
            .await
            .map_err(|e| rpc_err(&format!("{} gas estimation", label), e))?;
        let tx = tx.gas(gas_estimate * 120 / 100);

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| rpc_err(&format!("{} send", label), e))?;
        let tx_hash = pending.tx_hash();
        tracing::info!(chain = %self.chain, label, tx_hash = ?tx_hash, "[CHAIN] Transaction sent");

        match tokio::time::timeout(Duration::from_secs(RECEIPT_TIMEOUT_SECS), pending).await {
            Ok(Ok(Some(receipt))) => {
                if receipt.status == Some(U64::from(1)) {
                    tracing::info!(
                        chain = %self.chain,
                        label,
                        tx_hash = ?tx_hash,
                        block = ?receipt.block_number,
                        "[CHAIN] Transaction confirmed"
                    );
                    Ok(tx_hash)
                } else {
                    Err(VenueError::Reverted(format!("{} {:?} on {}", label, tx_hash, self.chain)))
                }
            }
            Ok(Ok(None)) => {
                tracing::warn!(chain = %self.chain, label, tx_hash = ?tx_hash, "[CHAIN] No receipt yet");
                Ok(tx_hash)
            }
            // Already broadcast: hand back the hash, settlement polling confirms it
            Ok(Err(e)) => {
                tracing::warn!(
                    chain = %self.chain,
                    label,
                    tx_hash = ?tx_hash,
                    error = %e,
                    "[CHAIN] Receipt polling failed, continuing with hash"
                );
                Ok(tx_hash)
            }
            Err(_) => {
                tracing::warn!(
                    chain = %self.chain,
                    label,
                    tx_hash = ?tx_hash,
                    timeout_s = RECEIPT_TIMEOUT_SECS,
                    "[CHAIN] Receipt timeout, continuing with hash"
                );
                Ok(tx_hash)
            }
        }
    }
}

/// Wallets on every configured EVM chain
#[derive(Default)]
pub struct EvmChains {
    chains: BTreeMap<Chain, Arc<EvmChain>>,
}

impl EvmChains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain: EvmChain) {
        self.chains.insert(chain.chain(), Arc::new(chain));
    }

    pub fn get(&self, chain: Chain) -> VenueResult<&Arc<EvmChain>> {
        self.chains
            .get(&chain)
            .ok_or_else(|| VenueError::Unsupported(format!("no wallet configured on {}", chain)))
    }

    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.chains.keys().copied()
    }
}

#[async_trait]
impl BalanceSource for EvmChains {
    async fn balance(&self, chain: Chain, token: &str) -> VenueResult<f64> {
        let wallet = self.get(chain)?;
        if token == NATIVE {
            wallet.native_balance().await
        } else {
            wallet.token_balance(token).await
        }
    }
}

#[async_trait]
impl NativeWrapper for EvmChains {
    async fn wrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()> {
        self.get(chain)?.wrap_native(wrapped_token, amount).await?;
        Ok(())
    }

    async fn unwrap_native(&self, chain: Chain, wrapped_token: &str, amount: f64) -> VenueResult<()> {
        self.get(chain)?.unwrap_native(wrapped_token, amount).await?;
        Ok(())
    }
}
