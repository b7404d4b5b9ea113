//! Venue adapters for Hyperliquid, the spot swap service, EVM chains and bridges
//!
//! The strategy core only sees the traits in [`traits`]; everything else in
//! this module is plumbing to real endpoints.

pub mod across;
pub mod chain;
pub mod errors;
pub mod hyperliquid;
pub mod swap;
pub mod test_utils;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use errors::{VenueError, VenueResult};
pub use types::{
    BridgeStatus, Chain, FundingSample, PerpFill, PositionInfo, SwapFill, SwapQuote, TransferId,
};
pub use traits::{BalanceSource, BridgeProvider, NativeWrapper, PerpVenue, SwapVenue};
pub use across::{AcrossBridge, AcrossConfig};
pub use chain::EvmChains;
pub use hyperliquid::{HyperliquidAdapter, HyperliquidBridge, HyperliquidConfig};
pub use swap::SwapServiceClient;
