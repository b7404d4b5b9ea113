//! Secrets and endpoints from the environment
//!
//! Loaded once at startup (after `dotenvy` has read `.env`). A missing
//! required variable is a configuration failure.
//!
//! | Variable | Required |
//! |----------|----------|
//! | `PRIVATE_KEY` | yes |
//! | `PUBLIC_ADDRESS` | yes |
//! | `SWAP_SERVICE_URL` | yes |
//! | `<CHAIN>_RPC_URL` | for every configured EVM chain |
//! | `HYPERLIQUID_API_URL` | no (mainnet/testnet default) |
//! | `ACROSS_API_URL` | no (`https://app.across.to/api`) |
//! | `SUPABASE_URL`, `SUPABASE_ANON_KEY` | with the `supabase` store backend |

use std::collections::BTreeMap;
use std::fmt;

use crate::adapters::types::Chain;
use crate::config::logging::SanitizedValue;
use crate::config::types::{AppConfig, StoreBackend};
use crate::error::AppError;

pub const DEFAULT_ACROSS_API_URL: &str = "https://app.across.to/api";

#[derive(Clone)]
pub struct SupabaseCredentials {
    pub url: String,
    pub anon_key: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub private_key: String,
    pub public_address: String,
    pub swap_service_url: String,
    pub rpc_urls: BTreeMap<Chain, String>,
    pub hyperliquid_api_url: Option<String>,
    pub across_api_url: String,
    pub supabase: Option<SupabaseCredentials>,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String, AppError> {
    optional(name).ok_or_else(|| {
        AppError::Config(format!("Missing required environment variable {}", name))
    })
}

impl Credentials {
    /// Read everything `config` needs from the environment
    pub fn from_env(config: &AppConfig) -> Result<Self, AppError> {
        let private_key = required("PRIVATE_KEY")?;
        let public_address = required("PUBLIC_ADDRESS")?;
        let swap_service_url = required("SWAP_SERVICE_URL")?;

        let mut rpc_urls = BTreeMap::new();
        for chain in config.evm_chains() {
            let var = format!("{}_RPC_URL", chain.env_prefix());
            rpc_urls.insert(chain, required(&var)?);
        }

        let supabase = if config.store.backend == StoreBackend::Supabase {
            Some(SupabaseCredentials {
                url: required("SUPABASE_URL")?,
                anon_key: required("SUPABASE_ANON_KEY")?,
            })
        } else {
            None
        };

        let credentials = Self {
            private_key,
            public_address,
            swap_service_url,
            rpc_urls,
            hyperliquid_api_url: optional("HYPERLIQUID_API_URL"),
            across_api_url: optional("ACROSS_API_URL")
                .unwrap_or_else(|| DEFAULT_ACROSS_API_URL.to_string()),
            supabase,
        };
        tracing::info!(
            address = %credentials.public_address,
            private_key = %SanitizedValue::new(&credentials.private_key),
            chains = ?credentials.rpc_urls.keys().collect::<Vec<_>>(),
            "[CONFIG] Credentials loaded"
        );
        Ok(credentials)
    }

    pub fn rpc_url(&self, chain: Chain) -> Result<&str, AppError> {
        self.rpc_urls
            .get(&chain)
            .map(|s| s.as_str())
            .ok_or_else(|| AppError::Config(format!("No RPC URL configured for {}", chain)))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key", &SanitizedValue::new(&self.private_key))
            .field("public_address", &self.public_address)
            .field("swap_service_url", &self.swap_service_url)
            .field("rpc_urls", &self.rpc_urls.keys().collect::<Vec<_>>())
            .field("supabase", &self.supabase.is_some())
            .finish()
    }
}
