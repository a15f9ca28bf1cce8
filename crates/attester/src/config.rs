//! Configuration management for the attester service.
//!
//! Loaded from a TOML file, with defaults for every tunable and an
//! environment override for the gateway credential
//! (`ATTESTRY_GATEWAY_TOKEN`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the attester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger gateway configuration
    pub ledger: LedgerConfig,

    /// Event indexer configuration
    pub indexer: IndexerConfig,

    /// Expiry loop configuration
    #[serde(default)]
    pub expiry: ExpiryConfig,

    /// Transaction batcher configuration
    #[serde(default)]
    pub batcher: BatcherConfig,
}

/// Ledger gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Base URL of the ledger gateway
    pub gateway_url: String,

    /// DID of the issuing account; only its attestations are managed
    pub issuer_did: String,

    /// Bearer token for the gateway, if it requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per read request before a transient failure propagates
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between read-request retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Event indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Base URL of the event-indexing service
    pub base_url: String,

    /// Rows per page (capped by the service)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Blocks per query range (the service caps range width per query)
    #[serde(default = "default_block_range")]
    pub block_range: u64,

    /// Rate-limit pause between fetches in milliseconds
    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per request before a transient failure propagates
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Expiry loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiryConfig {
    /// Seconds between expiry cycles (3600 = 1 hour).
    ///
    /// **Must be > 0** - Zero will cause a panic in tokio::time::interval.
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval_secs(),
        }
    }
}

/// Transaction batcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Submission attempts per item before its callers get a give-up error
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Overall timeout per transaction attempt in seconds
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

// Default value functions
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_page_size() -> u32 {
    100
}

fn default_block_range() -> u64 {
    100_000
}

fn default_fetch_interval_ms() -> u64 {
    1_000
}

fn default_cycle_interval_secs() -> u64 {
    3_600 // 1 hour
}

fn default_max_failures() -> u32 {
    5
}

fn default_submit_timeout_secs() -> u64 {
    600 // 10 minutes
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml(&raw)?;

        if let Ok(token) = std::env::var("ATTESTRY_GATEWAY_TOKEN") {
            config.ledger.auth_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse configuration")
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.gateway_url.trim().is_empty() {
            anyhow::bail!("ledger.gateway_url must not be empty");
        }
        if self.indexer.base_url.trim().is_empty() {
            anyhow::bail!("indexer.base_url must not be empty");
        }
        self.ledger
            .issuer_did
            .parse::<attestry_core::DidIdentifier>()
            .context("ledger.issuer_did is invalid")?;
        if self.indexer.page_size == 0 {
            anyhow::bail!("indexer.page_size must be > 0");
        }
        if self.indexer.block_range == 0 {
            anyhow::bail!("indexer.block_range must be > 0");
        }
        if self.expiry.cycle_interval_secs == 0 {
            anyhow::bail!("expiry.cycle_interval_secs must be > 0");
        }
        if self.batcher.max_failures == 0 {
            anyhow::bail!("batcher.max_failures must be > 0");
        }
        if self.batcher.submit_timeout_secs == 0 {
            anyhow::bail!("batcher.submit_timeout_secs must be > 0");
        }
        Ok(())
    }
}

impl LedgerConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay between read-request retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl IndexerConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay between retries.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Rate-limit pause between fetches.
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

impl ExpiryConfig {
    /// Pause between expiry cycles.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

impl BatcherConfig {
    /// Overall timeout per transaction attempt.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [ledger]
        gateway_url = "http://localhost:9933"
        issuer_did = "did:sample:issuer-1"

        [indexer]
        base_url = "http://localhost:4399"
    "#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.indexer.page_size, 100);
        assert_eq!(config.indexer.block_range, 100_000);
        assert_eq!(config.expiry.cycle_interval_secs, 3_600);
        assert_eq!(config.batcher.max_failures, 5);
        assert_eq!(config.batcher.submit_timeout_secs, 600);
        assert_eq!(config.ledger.auth_token, None);
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let raw = r#"
            [ledger]
            gateway_url = "http://localhost:9933"
            issuer_did = "did:sample:issuer-1"
            retry_attempts = 7

            [indexer]
            base_url = "http://localhost:4399"
            page_size = 50
            block_range = 10000

            [expiry]
            cycle_interval_secs = 60

            [batcher]
            max_failures = 2
            submit_timeout_secs = 30
        "#;
        let config = Config::from_toml(raw).unwrap();
        config.validate().unwrap();

        assert_eq!(config.ledger.retry_attempts, 7);
        assert_eq!(config.indexer.page_size, 50);
        assert_eq!(config.indexer.block_range, 10_000);
        assert_eq!(config.expiry.cycle_interval_secs, 60);
        assert_eq!(config.batcher.max_failures, 2);
        assert_eq!(config.batcher.submit_timeout_secs, 30);
    }

    #[test]
    fn test_validation_rejects_zero_intervals() {
        let raw = format!("{}\n[expiry]\ncycle_interval_secs = 0\n", MINIMAL);
        let config = Config::from_toml(&raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_issuer() {
        let raw = r#"
            [ledger]
            gateway_url = "http://localhost:9933"
            issuer_did = "  "

            [indexer]
            base_url = "http://localhost:4399"
        "#;
        let config = Config::from_toml(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_section_fails_to_parse() {
        let raw = r#"
            [indexer]
            base_url = "http://localhost:4399"
        "#;
        assert!(Config::from_toml(raw).is_err());
    }
}
