//! Fixed-layout token identifier.
//!
//! ```text
//! +---------+--------------------+--------------------+
//! | version | payment_hash       | token_id           |
//! | u16 BE  | 32 bytes           | 32 bytes           |
//! +---------+--------------------+--------------------+
//! ```
//!
//! The identifier is the macaroon's public id, so every token can be mapped
//! back to exactly one invoice without server-side session state.

use crate::error::{Error, Result};
use crate::invoice::{PaymentHash, HASH_SIZE};

/// Only identifier version understood by this crate.
pub const LATEST_VERSION: u16 = 0;

/// Size of the random token id.
pub const TOKEN_ID_SIZE: usize = 32;

/// Encoded identifier length.
pub const ENCODED_SIZE: usize = 2 + HASH_SIZE + TOKEN_ID_SIZE;

/// Token identifier binding a token to one payment hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identifier {
    /// Layout version.
    pub version: u16,
    /// Payment hash of the invoice this token was minted for.
    pub payment_hash: PaymentHash,
    /// Random per-token id.
    pub token_id: [u8; TOKEN_ID_SIZE],
}

impl Identifier {
    /// Create an identifier with a fresh random token id.
    #[must_use]
    pub fn new(payment_hash: PaymentHash) -> Self {
        Self {
            version: LATEST_VERSION,
            payment_hash,
            token_id: rand::random(),
        }
    }

    /// Encode into the fixed binary layout.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENCODED_SIZE);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(self.payment_hash.as_bytes());
        out.extend_from_slice(&self.token_id);
        out
    }

    /// Decode from the fixed binary layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedIdentifier`] if the version is unsupported or
    /// the length is wrong.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(Error::MalformedIdentifier(format!(
                "too short: {} bytes",
                bytes.len()
            )));
        }
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        if version != LATEST_VERSION {
            return Err(Error::MalformedIdentifier(format!(
                "unsupported version {version}"
            )));
        }
        if bytes.len() != ENCODED_SIZE {
            return Err(Error::MalformedIdentifier(format!(
                "expected {ENCODED_SIZE} bytes, got {}",
                bytes.len()
            )));
        }

        let mut payment_hash = [0u8; HASH_SIZE];
        payment_hash.copy_from_slice(&bytes[2..2 + HASH_SIZE]);
        let mut token_id = [0u8; TOKEN_ID_SIZE];
        token_id.copy_from_slice(&bytes[2 + HASH_SIZE..]);

        Ok(Self {
            version,
            payment_hash: PaymentHash(payment_hash),
            token_id,
        })
    }
}
