//! HTTP server: routes, builder and the running gate.

use crate::caveat::{Caveat, TIME_CONDITION};
use crate::config::{GateConfig, GatewayBackend};
use crate::error::{Error, Result};
use crate::event::{GateEvent, GateEventsChannel, GateEventsSender};
use crate::gate::{lsat_middleware, Gate, Grant};
use crate::gateway::{InvoiceGateway, LndGateway, LndGatewayConfig, MemoryGateway};
use crate::minter::CaveatProvider;
use crate::secret::MintingSecret;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Invoice state reported by `GET /invoice`.
#[derive(Debug, Serialize)]
pub struct InvoiceStatus {
    /// Hex payment hash.
    pub payment_hash: String,
    /// Payment request to pay.
    pub payment_request: String,
    /// Amount invoiced.
    pub amount_requested: u64,
    /// Amount received, once settled.
    pub amount_paid: Option<u64>,
    /// Whether the invoice is paid.
    pub settled: bool,
    /// Settlement time.
    pub settled_at: Option<DateTime<Utc>>,
    /// Invoice expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// End of the paid access window.
    pub access_until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ProtectedBody {
    message: &'static str,
    payment_hash: String,
    access_until: Option<DateTime<Utc>>,
}

/// Routes served by the gate.
///
/// - `GET /` is public
/// - `GET /invoice` reports invoice state for a presented token
/// - `GET /protected` sits behind [`lsat_middleware`]
pub fn router(gate: Arc<Gate>) -> Router {
    let protected = Router::new()
        .route("/protected", get(protected))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&gate),
            lsat_middleware,
        ));

    Router::new()
        .route("/", get(index))
        .route("/invoice", get(invoice_status))
        .merge(protected)
        .with_state(gate)
}

async fn index() -> &'static str {
    "lsat-gate: pay for access to /protected\n"
}

/// Rate of the token's own `time` caveat, else the configured one.
fn time_rate(gate: &Gate, caveats: &[Caveat]) -> u64 {
    caveats
        .iter()
        .find(|c| c.condition == TIME_CONDITION)
        .and_then(|c| c.value.parse().ok())
        .unwrap_or_else(|| gate.minter().time_policy().seconds_per_unit())
}

async fn invoice_status(State(gate): State<Arc<Gate>>, headers: HeaderMap) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match gate.inspect(authorization).await {
        Ok((token, invoice)) => {
            let rate = time_rate(&gate, &token.caveats().unwrap_or_default());
            Json(InvoiceStatus {
                payment_hash: invoice.payment_hash.to_hex(),
                access_until: invoice.access_until(rate),
                settled: invoice.is_settled(),
                payment_request: invoice.payment_request,
                amount_requested: invoice.amount_requested,
                amount_paid: invoice.amount_paid,
                settled_at: invoice.settled_at,
                expires_at: invoice.expires_at,
            })
            .into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn protected(State(gate): State<Arc<Gate>>, Extension(grant): Extension<Grant>) -> Response {
    let rate = time_rate(&gate, &grant.caveats);

    Json(ProtectedBody {
        message: "access granted",
        payment_hash: grant.invoice.payment_hash.to_hex(),
        access_until: grant.invoice.access_until(rate),
    })
    .into_response()
}

/// Load the minting secret, creating one on first start.
///
/// # Errors
///
/// Returns an error if the file exists but is invalid, or cannot be written.
pub fn load_or_create_secret(path: &Path) -> Result<MintingSecret> {
    if path.exists() {
        return MintingSecret::from_file(path);
    }

    warn!("No minting secret at {}, generating one", path.display());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let secret = MintingSecret::generate();
    secret.write_new(path)?;
    Ok(secret)
}

/// Builder for constructing a gate server.
pub struct GateBuilder {
    config: GateConfig,
    secret: Option<MintingSecret>,
    gateway: Option<Arc<dyn InvoiceGateway>>,
    providers: Option<Vec<CaveatProvider>>,
}

impl GateBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            secret: None,
            gateway: None,
            providers: None,
        }
    }

    /// Use `secret` instead of reading `secret_path`.
    #[must_use]
    pub fn with_secret(mut self, secret: MintingSecret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Use `gateway` instead of the configured backend.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn InvoiceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Replace the configured caveat providers.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<CaveatProvider>) -> Self {
        self.providers = Some(providers);
        self
    }

    fn configured_gateway(&self) -> Result<Arc<dyn InvoiceGateway>> {
        let gateway = &self.config.gateway;
        Ok(match gateway.backend {
            GatewayBackend::Memory => {
                warn!("Using in-memory gateway; invoices cannot be paid over Lightning");
                Arc::new(MemoryGateway::new())
            }
            GatewayBackend::Lnd => Arc::new(LndGateway::new(LndGatewayConfig {
                url: gateway.url.clone(),
                macaroon_hex: gateway.macaroon_hex.clone(),
                tls_cert_path: gateway.tls_cert_path.clone(),
                timeout: gateway.timeout(),
            })?),
        })
    }

    /// Build the gate and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the secret cannot be
    /// loaded or the address cannot be bound.
    pub async fn build(self) -> Result<RunningGate> {
        info!("Building lsat-gate for {}", self.config.listen);
        self.config.validate()?;

        let secret = match &self.secret {
            Some(secret) => secret.clone(),
            None => load_or_create_secret(&self.config.secret_path)?,
        };
        let gateway = match &self.gateway {
            Some(gateway) => Arc::clone(gateway),
            None => self.configured_gateway()?,
        };

        let mut gate = Gate::from_config(&self.config, secret, gateway);
        if let Some(providers) = self.providers {
            let minter = gate.minter().clone().with_providers(providers);
            gate = gate.with_minter(minter);
        }
        let gate = Arc::new(gate);

        let listener = TcpListener::bind(self.config.listen).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(RunningGate {
            events_tx: gate.events_sender(),
            gate,
            listener: Some(listener),
            local_addr,
            shutdown_tx,
            shutdown_rx,
        })
    }
}

/// A bound gate server.
pub struct RunningGate {
    gate: Arc<Gate>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: GateEventsSender,
}

impl RunningGate {
    /// Address the server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared gate.
    #[must_use]
    pub fn gate(&self) -> Arc<Gate> {
        Arc::clone(&self.gate)
    }

    /// Subscribe to gate events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle that stops the server when `true` is sent.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Serve until Ctrl-C or [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already run or fails while serving.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Config("gate server already ran".into()))?;

        info!("lsat-gate listening on {}", self.local_addr);
        let _ = self.events_tx.send(GateEvent::Started {
            addr: self.local_addr,
        });

        let mut shutdown_rx = self.shutdown_rx.clone();
        let signal = async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, shutting down");
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    info!("Shutdown requested");
                }
            }
        };

        let app = router(Arc::clone(&self.gate));
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        let _ = self.events_tx.send(GateEvent::ShuttingDown);
        let stats = self.gate.cache().stats();
        info!(
            "Settled invoice cache: {} entries, {} hits, {} misses ({:.1}% hit rate)",
            self.gate.cache().len(),
            stats.hits,
            stats.misses,
            stats.hit_rate()
        );
        info!("Gate shutdown complete");
        Ok(())
    }

    /// Request the server to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
