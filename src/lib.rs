//! Delta-neutral funding-rate arbitrage engine
//!
//! Short perp on Hyperliquid, long spot on an EVM chain, with:
//! - Venue adapters (Hyperliquid, swap service, EVM chains, bridges)
//! - Funding evaluation and leverage rebalancing
//! - Cross-chain plan execution and an append-only state log

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;

pub use error::AppError;
