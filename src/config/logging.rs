//! Logging configuration
//!
//! # Usage
//! ```rust,ignore
//! use funding_arb::config::logging::init_logging;
//! init_logging();
//! ```
//!
//! # Environment Variables
//! - `LOG_FORMAT`: Output format - `json` (default) or `pretty`
//! - `RUST_LOG`: Log level filter (default: `info`)

use std::fmt;

use tracing_subscriber::EnvFilter;

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format selected by `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Anything other than `pretty` means JSON
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize logging with configurable format
///
/// Reads `LOG_FORMAT` from environment:
/// - `json` (default): Machine-parseable JSON output for production
/// - `pretty`: Human-readable output for development
///
/// Also respects `RUST_LOG` for log level filtering (default: `info`).
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging() {
    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("[CONFIG] Logging already initialized");
    }
}

/// Wrapper for secrets that must never reach the logs verbatim.
///
/// Long values keep their first four characters, short ones are fully
/// redacted.
#[derive(Clone)]
pub struct SanitizedValue<'a>(&'a str);

impl<'a> SanitizedValue<'a> {
    pub fn new(value: &'a str) -> Self {
        Self(value)
    }
}

impl<'a> fmt::Display for SanitizedValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() > 8 && self.0.is_char_boundary(4) {
            write!(f, "{}...REDACTED", &self.0[..4])
        } else {
            write!(f, "REDACTED")
        }
    }
}

impl<'a> fmt::Debug for SanitizedValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SanitizedValue(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_defaults_to_json() {
        assert_eq!(LogFormat::from_env_value(None), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_env_value(Some("garbage")), LogFormat::Json);
    }

    #[test]
    fn test_log_format_pretty() {
        assert_eq!(LogFormat::from_env_value(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_env_value(Some(" Pretty ")), LogFormat::Pretty);
    }

    #[test]
    fn test_sanitized_long_value() {
        let key = "0x4c0883a69102937d6231471b5dbb6204fe512961708279f1d8b1f8e2a2f5b7a1";
        assert_eq!(SanitizedValue::new(key).to_string(), "0x4c...REDACTED");
    }

    #[test]
    fn test_sanitized_short_value() {
        assert_eq!(SanitizedValue::new("abc").to_string(), "REDACTED");
        assert_eq!(SanitizedValue::new("").to_string(), "REDACTED");
    }

    #[test]
    fn test_sanitized_debug_hides_everything() {
        let dbg = format!("{:?}", SanitizedValue::new("super-secret-anon-key"));
        assert!(!dbg.contains("super"));
    }
}
