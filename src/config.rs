//! Configuration for lsat-gate.

use crate::caveat::Caveat;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Payment node backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayBackend {
    /// LND over its REST proxy.
    #[default]
    Lnd,
    /// In-process invoices, for development.
    Memory,
}

/// Gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Location recorded in minted macaroons.
    #[serde(default = "default_location")]
    pub location: String,

    /// File holding the hex-encoded minting secret.
    #[serde(default = "default_secret_path")]
    pub secret_path: PathBuf,

    /// Pricing and access duration.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Optional caveats attached at mint time.
    #[serde(default)]
    pub caveats: CaveatConfig,

    /// Payment node connection.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Pricing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Seconds of access bought per unit paid.
    #[serde(default = "default_seconds_per_unit")]
    pub seconds_per_unit: u64,

    /// Amount invoiced when the client does not ask for one.
    #[serde(default = "default_price")]
    pub price: u64,

    /// Smallest amount a client may request.
    #[serde(default = "default_min_amount")]
    pub min_amount: u64,

    /// Largest amount a client may request.
    #[serde(default = "default_max_amount")]
    pub max_amount: u64,

    /// Invoice expiry in seconds.
    #[serde(default = "default_invoice_expiry")]
    pub invoice_expiry_secs: u64,

    /// Memo attached to invoices.
    #[serde(default = "default_description")]
    pub description: String,
}

/// Caveat configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaveatConfig {
    /// Bind tokens to the client address they were minted for.
    #[serde(default)]
    pub origin: bool,

    /// Caveats attached to every token, e.g. `static = ["service=weather"]`.
    ///
    /// Each condition needs a verifier registered on the gate, otherwise
    /// tokens carrying it are refused.
    #[serde(default, rename = "static", skip_serializing_if = "Vec::is_empty")]
    pub static_caveats: Vec<Caveat>,
}

/// Payment node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend kind.
    #[serde(default)]
    pub backend: GatewayBackend,

    /// REST endpoint of the node.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Hex-encoded invoice macaroon.
    #[serde(default)]
    pub macaroon_hex: Option<String>,

    /// TLS certificate of the node.
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Settled invoices kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            location: default_location(),
            secret_path: default_secret_path(),
            pricing: PricingConfig::default(),
            caveats: CaveatConfig::default(),
            gateway: GatewayConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            seconds_per_unit: default_seconds_per_unit(),
            price: default_price(),
            min_amount: default_min_amount(),
            max_amount: default_max_amount(),
            invoice_expiry_secs: default_invoice_expiry(),
            description: default_description(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: GatewayBackend::default(),
            url: default_gateway_url(),
            macaroon_hex: None,
            tls_cert_path: None,
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_location() -> String {
    "lsat-gate".to_string()
}

fn default_secret_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "lsat-gate")
        .map(|dirs| dirs.data_dir().join("secret.hex"))
        .unwrap_or_else(|| PathBuf::from(".lsat-gate/secret.hex"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_seconds_per_unit() -> u64 {
    1
}

const fn default_price() -> u64 {
    10
}

const fn default_min_amount() -> u64 {
    1
}

const fn default_max_amount() -> u64 {
    1_000_000
}

const fn default_invoice_expiry() -> u64 {
    3600 // 1 hour
}

fn default_description() -> String {
    "lsat-gate access".to_string()
}

fn default_gateway_url() -> String {
    "https://127.0.0.1:8080".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_cache_capacity() -> usize {
    10_000
}

impl GateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let pricing = &self.pricing;
        if pricing.seconds_per_unit == 0 {
            return Err(Error::Config("pricing.seconds_per_unit must be at least 1".into()));
        }
        if pricing.min_amount == 0 {
            return Err(Error::Config("pricing.min_amount must be at least 1".into()));
        }
        if pricing.min_amount > pricing.max_amount {
            return Err(Error::Config(format!(
                "pricing.min_amount ({}) exceeds pricing.max_amount ({})",
                pricing.min_amount, pricing.max_amount
            )));
        }
        if !(pricing.min_amount..=pricing.max_amount).contains(&pricing.price) {
            return Err(Error::Config(format!(
                "pricing.price ({}) outside [{}, {}]",
                pricing.price, pricing.min_amount, pricing.max_amount
            )));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(Error::Config("gateway.timeout_secs must be at least 1".into()));
        }
        if self.gateway.backend == GatewayBackend::Lnd && self.gateway.url.is_empty() {
            return Err(Error::Config("gateway.url is required for the lnd backend".into()));
        }
        Ok(())
    }
}
