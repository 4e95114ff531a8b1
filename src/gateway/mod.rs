//! Invoice gateway: the connection to the payment node.
//!
//! The gate only consumes two operations from the payment network, creating
//! an invoice and looking one up by payment hash. Settlement is owned by the
//! node and is monotonic (unsettled → settled, never back).
//!
//! # Architecture
//!
//! ```text
//! token presented
//!        │
//!        ▼
//! ┌──────────────────────┐
//! │ Settled-invoice cache│
//! └──────────┬───────────┘
//!            │
//!     ┌──────┴──────┐
//!     │             │
//!    HIT          MISS
//!     │             │
//!     ▼             ▼
//!  settled     get_invoice (LND / memory)
//!                   │
//!            ┌──────┴──────┐
//!            │             │
//!         SETTLED      UNSETTLED
//!            │             │
//!            ▼             ▼
//!       cache + use     deny (402)
//! ```

mod cache;
mod lnd;
mod memory;

pub use cache::{CacheStats, SettledInvoiceCache};
pub use lnd::{LndGateway, LndGatewayConfig};
pub use memory::MemoryGateway;

use crate::error::Result;
use crate::invoice::{Invoice, PaymentHash};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Access to invoices on the payment node.
///
/// Implementations must map connectivity failures and timeouts to
/// [`Error::GatewayUnavailable`](crate::Error::GatewayUnavailable) and unknown
/// hashes to [`Error::InvoiceNotFound`](crate::Error::InvoiceNotFound).
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    /// Create a new invoice.
    async fn create_invoice(
        &self,
        amount: u64,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Invoice>;

    /// Current state of the invoice with `payment_hash`.
    async fn get_invoice(&self, payment_hash: &PaymentHash) -> Result<Invoice>;
}
