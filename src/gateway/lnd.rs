//! LND REST gateway.
//!
//! Talks to an LND node over its REST proxy:
//! - `POST /v1/invoices` to create invoices
//! - `GET /v1/invoice/{r_hash_hex}` to look them up
//!
//! Authentication uses the hex-encoded invoice macaroon in the
//! `Grpc-Metadata-macaroon` header.

use super::InvoiceGateway;
use crate::error::{Error, Result};
use crate::invoice::{Invoice, PaymentHash, HASH_SIZE};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Header carrying the LND macaroon.
const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Configuration for the LND gateway.
#[derive(Debug, Clone)]
pub struct LndGatewayConfig {
    /// Base URL of the REST proxy, e.g. `https://127.0.0.1:8080`.
    pub url: String,
    /// Hex-encoded invoice macaroon.
    pub macaroon_hex: Option<String>,
    /// PEM certificate of the node (LND uses self-signed certificates).
    pub tls_cert_path: Option<PathBuf>,
    /// Timeout applied to every call.
    pub timeout: Duration,
}

impl Default for LndGatewayConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1:8080".to_string(),
            macaroon_hex: None,
            tls_cert_path: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Invoice gateway backed by an LND node.
pub struct LndGateway {
    config: LndGatewayConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct AddInvoiceRequest<'a> {
    value: String,
    memo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
}

#[derive(Deserialize)]
struct AddInvoiceResponse {
    r_hash: String,
    payment_request: String,
}

#[derive(Deserialize)]
struct LookupInvoiceResponse {
    #[serde(default)]
    memo: String,
    #[serde(default)]
    payment_request: String,
    #[serde(default, deserialize_with = "de_u64")]
    value: u64,
    #[serde(default)]
    settled: bool,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, deserialize_with = "de_u64")]
    creation_date: u64,
    #[serde(default, deserialize_with = "de_u64")]
    settle_date: u64,
    #[serde(default, deserialize_with = "de_u64")]
    expiry: u64,
    #[serde(default, deserialize_with = "de_u64")]
    amt_paid_sat: u64,
}

/// LND's REST proxy renders int64 fields as JSON strings.
fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    match NumOrString::deserialize(deserializer)? {
        NumOrString::Num(n) => Ok(n),
        NumOrString::Str(s) if s.is_empty() => Ok(0),
        NumOrString::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn timestamp(secs: u64) -> Option<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

impl LookupInvoiceResponse {
    fn into_invoice(self, payment_hash: PaymentHash) -> Invoice {
        let settled = self.settled || self.state.as_deref() == Some("SETTLED");
        let created_at = timestamp(self.creation_date).unwrap_or_else(Utc::now);
        let settled_at = if settled {
            Some(timestamp(self.settle_date).unwrap_or(created_at))
        } else {
            None
        };
        let expires_at = (self.expiry > 0)
            .then(|| i64::try_from(self.expiry).ok())
            .flatten()
            .and_then(|secs| created_at.checked_add_signed(chrono::Duration::seconds(secs)));

        Invoice {
            payment_hash,
            payment_request: self.payment_request,
            amount_requested: self.value,
            amount_paid: (settled && self.amt_paid_sat > 0).then_some(self.amt_paid_sat),
            created_at,
            settled_at,
            expires_at,
            description: self.memo,
        }
    }
}

impl LndGateway {
    /// Create a gateway for the configured node.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS certificate cannot be read or the HTTP
    /// client cannot be built.
    pub fn new(config: LndGatewayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if let Some(path) = &config.tls_cert_path {
            let pem = std::fs::read(path)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Config(format!("invalid LND certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        info!("LND gateway configured for {}", config.url);
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.macaroon_hex {
            Some(macaroon) => request.header(MACAROON_HEADER, macaroon),
            None => request,
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, reqwest::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("LND request failed: {e}");
                Err(Error::GatewayUnavailable(format!("LND request failed: {e}")))
            }
            Err(_) => {
                warn!("LND request timed out");
                Err(Error::GatewayUnavailable("LND request timed out".to_string()))
            }
        }
    }
}

#[async_trait]
impl InvoiceGateway for LndGateway {
    async fn create_invoice(
        &self,
        amount: u64,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Invoice> {
        let now = Utc::now();
        let expiry = expires_at.map(|at| (at - now).num_seconds().max(1).to_string());
        let body = AddInvoiceRequest {
            value: amount.to_string(),
            memo: description,
            expiry,
        };

        let request = self.authorize(self.client.post(self.endpoint("/v1/invoices")).json(&body));
        let response = self.with_timeout(request.send()).await?;
        if !response.status().is_success() {
            let status = response.status();
            warn!("LND refused invoice creation: {status}");
            return Err(Error::GatewayUnavailable(format!(
                "invoice creation returned {status}"
            )));
        }
        let created: AddInvoiceResponse = self.with_timeout(response.json()).await?;

        let raw_hash = STANDARD
            .decode(&created.r_hash)
            .map_err(|e| Error::GatewayUnavailable(format!("invalid r_hash from LND: {e}")))?;
        let hash: [u8; HASH_SIZE] = raw_hash
            .try_into()
            .map_err(|_| Error::GatewayUnavailable("r_hash has wrong length".to_string()))?;
        let payment_hash = PaymentHash(hash);

        debug!("Created LND invoice {} for {}", payment_hash, amount);
        Ok(Invoice {
            payment_hash,
            payment_request: created.payment_request,
            amount_requested: amount,
            amount_paid: None,
            created_at: now,
            settled_at: None,
            expires_at,
            description: description.to_string(),
        })
    }

    async fn get_invoice(&self, payment_hash: &PaymentHash) -> Result<Invoice> {
        let url = self.endpoint(&format!("/v1/invoice/{}", payment_hash.to_hex()));
        let response = self
            .with_timeout(self.authorize(self.client.get(url)).send())
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::InvoiceNotFound(payment_hash.to_hex()));
        }
        if !status.is_success() {
            // LND reports unknown hashes as a generic error with this message.
            let text = self.with_timeout(response.text()).await.unwrap_or_default();
            if text.contains("unable to locate invoice") {
                return Err(Error::InvoiceNotFound(payment_hash.to_hex()));
            }
            warn!("LND invoice lookup returned {status}");
            return Err(Error::GatewayUnavailable(format!(
                "invoice lookup returned {status}"
            )));
        }

        let lookup: LookupInvoiceResponse = self.with_timeout(response.json()).await?;
        Ok(lookup.into_invoice(*payment_hash))
    }
}
