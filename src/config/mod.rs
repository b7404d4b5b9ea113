//! Configuration module
//!
//! This module provides:
//! - Configuration types (`AppConfig` and its sections)
//! - YAML loading functionality (`load_config`)
//! - Secrets and endpoints from the environment (`Credentials`)
//! - Logging setup (`logging::init_logging`)

pub mod credentials;
pub mod logging;
mod loader;
mod types;

// Re-export types
pub use types::{
    AppConfig, BridgeConfig, ChainsConfig, ControlConfig, HyperliquidConfig, StoreBackend,
    StoreConfig, StrategyConfig, TokensConfig,
};

pub use credentials::Credentials;

// Re-export loader functions
pub use loader::{load_config, load_config_from_str};

/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "FUNDING_ARB_CONFIG";

/// Default config file path
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Config path from `FUNDING_ARB_CONFIG`, else `config.yaml`
pub fn config_path() -> std::path::PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from(DEFAULT_CONFIG_PATH))
}
