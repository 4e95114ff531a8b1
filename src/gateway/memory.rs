//! In-process invoice gateway for development and tests.
//!
//! Invoices live in memory and are settled explicitly with
//! [`MemoryGateway::settle`], standing in for a client paying over Lightning.

use super::InvoiceGateway;
use crate::error::{Error, Result};
use crate::invoice::{Invoice, PaymentHash, Preimage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

struct Entry {
    invoice: Invoice,
    preimage: Preimage,
}

/// Gateway keeping invoices in a process-local map.
pub struct MemoryGateway {
    invoices: Mutex<HashMap<PaymentHash, Entry>>,
    available: AtomicBool,
}

impl MemoryGateway {
    /// Empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            invoices: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the payment node going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Mark an invoice paid and return its preimage.
    ///
    /// Settling twice keeps the first settlement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvoiceNotFound`] for unknown hashes.
    pub fn settle(
        &self,
        payment_hash: &PaymentHash,
        amount_paid: u64,
        settled_at: DateTime<Utc>,
    ) -> Result<Preimage> {
        let mut invoices = self.invoices.lock();
        let entry = invoices
            .get_mut(payment_hash)
            .ok_or_else(|| Error::InvoiceNotFound(payment_hash.to_hex()))?;
        if !entry.invoice.is_settled() {
            entry.invoice.amount_paid = Some(amount_paid);
            entry.invoice.settled_at = Some(settled_at);
            info!("Invoice {} settled for {}", payment_hash, amount_paid);
        }
        Ok(entry.preimage)
    }

    /// Number of invoices created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invoices.lock().len()
    }

    /// Whether no invoice has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invoices.lock().is_empty()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::GatewayUnavailable("memory gateway offline".into()))
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceGateway for MemoryGateway {
    async fn create_invoice(
        &self,
        amount: u64,
        description: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Invoice> {
        self.ensure_available()?;

        let preimage = Preimage::random();
        let payment_hash = preimage.payment_hash();
        let invoice = Invoice {
            payment_hash,
            payment_request: format!("lnbcrt{amount}n1p{}", &payment_hash.to_hex()[..20]),
            amount_requested: amount,
            amount_paid: None,
            created_at: Utc::now(),
            settled_at: None,
            expires_at,
            description: description.to_string(),
        };

        debug!("Created in-memory invoice {}", payment_hash);
        self.invoices.lock().insert(
            payment_hash,
            Entry {
                invoice: invoice.clone(),
                preimage,
            },
        );
        Ok(invoice)
    }

    async fn get_invoice(&self, payment_hash: &PaymentHash) -> Result<Invoice> {
        self.ensure_available()?;
        self.invoices
            .lock()
            .get(payment_hash)
            .map(|entry| entry.invoice.clone())
            .ok_or_else(|| Error::InvoiceNotFound(payment_hash.to_hex()))
    }
}
