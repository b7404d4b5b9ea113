//! Process wiring
//!
//! Builds the production collaborators (perp venue, swap service, chain
//! wallets, bridges, state log) from the YAML config plus environment
//! credentials, and owns the shutdown signal plumbing shared by the binaries.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::adapters::across::{AcrossBridge, AcrossConfig};
use crate::adapters::chain::{EvmChain, EvmChains};
use crate::adapters::hyperliquid::{HyperliquidAdapter, HyperliquidBridge, HyperliquidConfig};
use crate::adapters::swap::SwapServiceClient;
use crate::adapters::traits::BridgeProvider;
use crate::config::{AppConfig, Credentials, StoreBackend};
use crate::core::store::{JsonlStateStore, MemoryStateStore, StateSink, SupabaseStateStore};
use crate::core::strategy::StrategyDeps;
use crate::error::AppError;

/// State log selected by `store.backend`
pub fn build_store(config: &AppConfig, credentials: &Credentials) -> Result<Arc<dyn StateSink>, AppError> {
    let store: Arc<dyn StateSink> = match config.store.backend {
        StoreBackend::Jsonl => Arc::new(JsonlStateStore::new(&config.store.path)),
        StoreBackend::Memory => Arc::new(MemoryStateStore::new()),
        StoreBackend::Supabase => {
            let supabase = credentials.supabase.as_ref().ok_or_else(|| {
                AppError::Config("supabase backend selected without SUPABASE_URL".to_string())
            })?;
            Arc::new(SupabaseStateStore::new(&supabase.url, &supabase.anon_key)?)
        }
    };
    info!(backend = ?config.store.backend, "[STORE] State log ready");
    Ok(store)
}

/// Wallet handles on every EVM chain the config touches
pub fn build_chains(config: &AppConfig, credentials: &Credentials) -> Result<EvmChains, AppError> {
    let mut chains = EvmChains::new();
    for chain in config.evm_chains() {
        let tokens = config.tokens.addresses.get(&chain).cloned().unwrap_or_default();
        chains.insert(EvmChain::new(
            chain,
            credentials.rpc_url(chain)?,
            &credentials.private_key,
            &tokens,
        )?);
    }
    Ok(chains)
}

/// Everything the strategy loop talks to
pub fn build_deps(config: &AppConfig, credentials: &Credentials) -> Result<StrategyDeps, AppError> {
    let chains = Arc::new(build_chains(config, credentials)?);

    let perp = Arc::new(HyperliquidAdapter::new(HyperliquidConfig::new(
        credentials.hyperliquid_api_url.clone(),
        config.hyperliquid.testnet,
        &credentials.private_key,
        &credentials.public_address,
    ))?);

    let spot_tokens = config
        .tokens
        .addresses
        .get(&config.chains.spot)
        .cloned()
        .unwrap_or_default();
    let swap = Arc::new(SwapServiceClient::new(
        &credentials.swap_service_url,
        config.chains.spot,
        spot_tokens,
        &config.tokens.native_symbol,
    ));

    let bridges: Vec<Arc<dyn BridgeProvider>> = vec![
        Arc::new(HyperliquidBridge::new(perp.clone(), chains.clone())),
        Arc::new(AcrossBridge::new(
            &AcrossConfig {
                api_url: credentials.across_api_url.clone(),
            },
            chains.clone(),
        )),
    ];

    info!(
        testnet = config.hyperliquid.testnet,
        spot = %config.chains.spot,
        chains = ?chains.chains().collect::<Vec<_>>(),
        bridges = bridges.len(),
        "[CONFIG] Adapters constructed"
    );

    Ok(StrategyDeps {
        perp,
        swap,
        bridges,
        wrapper: chains.clone(),
        balances: chains,
        store: build_store(config, credentials)?,
    })
}

/// Broadcast a shutdown on Ctrl+C
pub fn spawn_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                let _ = shutdown_tx.send(());
            }
            Err(err) => {
                error!(error = %err, "[SHUTDOWN] Failed to listen for Ctrl+C");
            }
        }
    });
}
