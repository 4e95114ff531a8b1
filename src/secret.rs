//! Minting secret and per-token root key derivation.

use crate::error::{Error, Result};
use crate::identifier::Identifier;
use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Secret size in bytes.
pub const SECRET_SIZE: usize = 32;

/// Permissions of a written secret file: owner read/write only.
#[cfg(unix)]
const SECRET_FILE_MODE: u32 = 0o600;

/// Domain separation for root key derivation.
const ROOT_KEY_INFO: &[u8] = b"lsat-gate-root-key-v0";

/// Process-wide secret all token root keys are derived from.
///
/// Immutable for the life of the server; rotating it invalidates every
/// outstanding token.
#[derive(Clone, PartialEq, Eq)]
pub struct MintingSecret([u8; SECRET_SIZE]);

impl MintingSecret {
    /// Wrap raw secret bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Fresh random secret.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Parse a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the input is not 64 hex characters.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let mut bytes = [0u8; SECRET_SIZE];
        hex::decode_to_slice(encoded.trim(), &mut bytes)
            .map_err(|e| Error::Config(format!("invalid minting secret: {e}")))?;
        Ok(Self(bytes))
    }

    /// Hex encoding, as written by `lsat-keygen`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Load a hex-encoded secret from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold a secret.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_hex(&content)
    }

    /// Write the secret as hex to a new file only the owner can read.
    ///
    /// # Errors
    ///
    /// Returns an error if the file already exists or cannot be written.
    pub fn write_new(&self, path: &Path) -> Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(SECRET_FILE_MODE);

        let mut file = options.open(path)?;
        file.write_all(self.to_hex().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Root key for the macaroon carrying `identifier`.
    ///
    /// Each token gets its own key so no two tokens share a signature chain
    /// origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if key expansion fails.
    pub fn root_key(&self, identifier: &Identifier) -> Result<[u8; SECRET_SIZE]> {
        let hk = Hkdf::<Sha256>::new(None, &self.0);
        let id = identifier.encode();
        let mut okm = [0u8; SECRET_SIZE];
        hk.expand_multi_info(&[ROOT_KEY_INFO, id.as_slice()], &mut okm)
            .map_err(|e| Error::Config(format!("root key derivation failed: {e}")))?;
        Ok(okm)
    }
}

impl fmt::Debug for MintingSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MintingSecret(..)")
    }
}
