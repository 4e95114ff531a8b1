//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use lsat_gate::config::{GateConfig, GatewayBackend};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Lightning-paid LSAT authorization gate.
#[derive(Parser, Debug)]
#[command(name = "lsat-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, short, env = "LSAT_GATE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// File holding the hex minting secret (created if missing).
    #[arg(long, env = "LSAT_GATE_SECRET_PATH")]
    pub secret_path: Option<PathBuf>,

    /// Seconds of access per unit paid.
    #[arg(long, env = "LSAT_GATE_SECONDS_PER_UNIT")]
    pub seconds_per_unit: Option<u64>,

    /// Default invoice amount.
    #[arg(long, env = "LSAT_GATE_PRICE")]
    pub price: Option<u64>,

    /// Bind tokens to the client IP they were issued to.
    #[arg(long, env = "LSAT_GATE_ORIGIN_CAVEAT")]
    pub origin_caveat: bool,

    /// Payment node backend.
    #[arg(long, value_enum, env = "LSAT_GATE_BACKEND")]
    pub backend: Option<CliBackend>,

    /// LND REST URL.
    #[arg(long, env = "LSAT_GATE_LND_URL")]
    pub lnd_url: Option<String>,

    /// Hex-encoded LND invoice macaroon.
    #[arg(long, env = "LSAT_GATE_LND_MACAROON", hide_env_values = true)]
    pub lnd_macaroon: Option<String>,

    /// LND TLS certificate.
    #[arg(long, env = "LSAT_GATE_LND_TLS_CERT")]
    pub lnd_tls_cert: Option<PathBuf>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON.
    #[arg(long)]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Backend CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliBackend {
    /// LND REST proxy.
    Lnd,
    /// In-process invoices.
    Memory,
}

impl Cli {
    /// Convert CLI arguments into a `GateConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<GateConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            GateConfig::from_file(path)?
        } else {
            GateConfig::default()
        };

        // Override with CLI arguments
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(secret_path) = self.secret_path {
            config.secret_path = secret_path;
        }
        if let Some(seconds_per_unit) = self.seconds_per_unit {
            config.pricing.seconds_per_unit = seconds_per_unit;
        }
        if let Some(price) = self.price {
            config.pricing.price = price;
        }
        if self.origin_caveat {
            config.caveats.origin = true;
        }
        config.log_level = self.log_level;

        // Gateway config
        if let Some(backend) = self.backend {
            config.gateway.backend = backend.into();
        }
        if let Some(url) = self.lnd_url {
            config.gateway.url = url;
        }
        if self.lnd_macaroon.is_some() {
            config.gateway.macaroon_hex = self.lnd_macaroon;
        }
        if self.lnd_tls_cert.is_some() {
            config.gateway.tls_cert_path = self.lnd_tls_cert;
        }

        Ok(config)
    }
}

impl From<CliBackend> for GatewayBackend {
    fn from(b: CliBackend) -> Self {
        match b {
            CliBackend::Lnd => Self::Lnd,
            CliBackend::Memory => Self::Memory,
        }
    }
}
