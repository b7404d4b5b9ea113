//! Hyperliquid perp venue
//!
//! - `client`: REST adapter implementing `PerpVenue`
//! - `bridge`: USDC bridge to and from Arbitrum
//! - `signing`: EIP-712 signing of L1 and user-signed actions
//! - `wire`: request/response shapes and number formatting

pub mod bridge;
pub mod client;
pub mod signing;
pub mod wire;

pub use bridge::HyperliquidBridge;
pub use client::{HyperliquidAdapter, HyperliquidConfig};
