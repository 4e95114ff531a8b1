//! Invoice records and the hashes that tie them to tokens.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a payment hash or preimage in bytes.
pub const HASH_SIZE: usize = 32;

/// SHA-256 hash of an invoice preimage. Identifies exactly one invoice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaymentHash(pub [u8; HASH_SIZE]);

impl PaymentHash {
    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentHash({})", self.to_hex())
    }
}

impl FromStr for PaymentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Proof of payment revealed by the payment network once an invoice is paid.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Preimage(pub [u8; HASH_SIZE]);

impl Preimage {
    /// Generate a random preimage.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// The payment hash this preimage unlocks.
    #[must_use]
    pub fn payment_hash(&self) -> PaymentHash {
        PaymentHash(Sha256::digest(self.0).into())
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preimage(..)")
    }
}

impl FromStr for Preimage {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// An invoice as reported by the payment gateway.
///
/// Settlement is one-way: once `settled_at` is set it never clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Hash correlating the invoice with issued tokens.
    pub payment_hash: PaymentHash,
    /// Encoded payment request (BOLT 11) the client pays.
    pub payment_request: String,
    /// Amount asked for, in the gateway's unit (satoshis for LND).
    pub amount_requested: u64,
    /// Amount actually paid, known only after settlement.
    pub amount_paid: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Settlement time, `None` while unpaid.
    pub settled_at: Option<DateTime<Utc>>,
    /// Expiry of the payment request.
    pub expires_at: Option<DateTime<Utc>>,
    /// Free-form description embedded in the payment request.
    pub description: String,
}

impl Invoice {
    /// Whether the invoice has been paid.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.settled_at.is_some()
    }

    /// End of the access window bought by this invoice at the given rate.
    ///
    /// Returns `None` while the invoice is unsettled. Falls back to the
    /// requested amount when the gateway does not report the paid amount.
    #[must_use]
    pub fn access_until(&self, seconds_per_unit: u64) -> Option<DateTime<Utc>> {
        let settled_at = self.settled_at?;
        let paid = self.amount_paid.unwrap_or(self.amount_requested);
        let seconds = i64::try_from(paid.saturating_mul(seconds_per_unit)).unwrap_or(i64::MAX);
        let until = Duration::try_seconds(seconds).and_then(|w| settled_at.checked_add_signed(w));
        Some(until.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}
