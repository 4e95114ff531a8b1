//! # lsat-gate
//!
//! Lightning-paid authorization for HTTP routes using LSATs: macaroons
//! bound to a Lightning invoice.
//!
//! A request without credentials gets `402 Payment Required` with an invoice
//! and a freshly minted macaroon. After paying, the client presents
//!
//! ```text
//! Authorization: LSAT <base64 macaroon>:<preimage hex>
//! ```
//!
//! and is let through while the invoice is settled and every caveat on the
//! macaroon holds. The built-in `time` caveat grants access for
//! `amount_paid * seconds_per_unit` seconds from settlement.
//!
//! ## Usage
//!
//! ```ignore
//! use lsat_gate::{lsat_middleware, Gate, MemoryGateway};
//!
//! let gate = Arc::new(Gate::from_config(&config, secret, Arc::new(MemoryGateway::new())));
//! let app = Router::new()
//!     .route("/paid", get(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(gate, lsat_middleware));
//! ```

pub mod caveat;
pub mod config;
pub mod error;
pub mod event;
pub mod gate;
pub mod gateway;
pub mod identifier;
pub mod invoice;
pub mod minter;
pub mod request;
pub mod secret;
pub mod server;
pub mod token;

pub use caveat::{Caveat, CaveatRegistry, CaveatVerifier, Comparator, TimeCaveatPolicy, Verdict};
pub use config::GateConfig;
pub use error::{Error, Result};
pub use event::{GateEvent, GateEventsChannel};
pub use gate::{default_registry, lsat_middleware, Gate, GateState, Grant, Outcome};
pub use gateway::{InvoiceGateway, LndGateway, MemoryGateway, SettledInvoiceCache};
pub use identifier::Identifier;
pub use invoice::{Invoice, PaymentHash, Preimage};
pub use minter::{CaveatProvider, Minter};
pub use request::{resolve_origin, RequestContext};
pub use secret::MintingSecret;
pub use server::{router, GateBuilder, RunningGate};
pub use token::Token;
