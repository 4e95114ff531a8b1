//! The transported access token (LSAT): a macaroon plus payment data.
//!
//! Wire formats:
//!
//! ```text
//! WWW-Authenticate: LSAT macaroon="<base64>", invoice="<payment request>"
//! Authorization:    LSAT <base64>:<preimage hex>
//! ```
//!
//! The preimage part of `Authorization` may be empty when the client only
//! wants to refer to its token, e.g. to poll invoice status.
//!
//! Macaroons travel in the libmacaroons v2 binary layout as standard base64;
//! URL-safe base64 is accepted on input.

use crate::caveat::Caveat;
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::invoice::{PaymentHash, Preimage};
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use macaroon::{Format, Macaroon};

/// Authentication scheme used in headers.
pub const SCHEME: &str = "LSAT";

/// Newer name of the same scheme, accepted on input.
pub const SCHEME_L402: &str = "L402";

/// Version byte of the v2 binary layout.
const MACAROON_V2: u8 = 2;

/// A macaroon bound to one invoice, with optional proof of payment.
#[derive(Debug, Clone)]
pub struct Token {
    macaroon: Macaroon,
    encoded: String,
    identifier: Identifier,
    payment_request: Option<String>,
    preimage: Option<Preimage>,
}

impl Token {
    /// Wrap a macaroon, decoding its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedIdentifier`] if the macaroon id is not a
    /// valid identifier.
    pub fn from_macaroon(macaroon: Macaroon) -> Result<Self> {
        let identifier = Identifier::decode(&macaroon.identifier().0)?;
        let encoded = encode_macaroon(&macaroon)?;
        Ok(Self {
            macaroon,
            encoded,
            identifier,
            payment_request: None,
            preimage: None,
        })
    }

    /// Attach the payment request the token was issued with.
    #[must_use]
    pub fn with_payment_request(mut self, payment_request: impl Into<String>) -> Self {
        self.payment_request = Some(payment_request.into());
        self
    }

    /// Attach proof of payment.
    #[must_use]
    pub fn with_preimage(mut self, preimage: Preimage) -> Self {
        self.preimage = Some(preimage);
        self
    }

    /// Underlying macaroon.
    #[must_use]
    pub const fn macaroon(&self) -> &Macaroon {
        &self.macaroon
    }

    /// Standard base64 of the macaroon, as sent on the wire.
    #[must_use]
    pub fn encoded_macaroon(&self) -> &str {
        &self.encoded
    }

    /// Decoded identifier.
    #[must_use]
    pub const fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Payment hash of the invoice backing this token.
    #[must_use]
    pub const fn payment_hash(&self) -> &PaymentHash {
        &self.identifier.payment_hash
    }

    /// Payment request, known only on freshly minted or challenge-parsed tokens.
    #[must_use]
    pub fn payment_request(&self) -> Option<&str> {
        self.payment_request.as_deref()
    }

    /// Proof of payment, if presented.
    #[must_use]
    pub const fn preimage(&self) -> Option<&Preimage> {
        self.preimage.as_ref()
    }

    /// Caveats in chain order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if any caveat cannot be parsed.
    /// Third-party caveats are rejected.
    pub fn caveats(&self) -> Result<Vec<Caveat>> {
        self.macaroon
            .caveats()
            .into_iter()
            .map(|caveat| match caveat {
                macaroon::Caveat::FirstParty(first) => {
                    let predicate = first.predicate();
                    let text = std::str::from_utf8(&predicate.0)
                        .map_err(|_| Error::MalformedToken("caveat is not utf-8".into()))?;
                    Caveat::decode(text)
                }
                macaroon::Caveat::ThirdParty(_) => Err(Error::MalformedToken(
                    "third-party caveats are not supported".into(),
                )),
            })
            .collect()
    }

    /// Narrow the token with another caveat. Existing caveats are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if the extended macaroon cannot be
    /// serialized.
    pub fn add_caveat(&mut self, caveat: &Caveat) -> Result<()> {
        self.macaroon.add_first_party_caveat(caveat.encode().as_str().into());
        self.encoded = encode_macaroon(&self.macaroon)?;
        Ok(())
    }

    /// Check the presented preimage against the payment hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPreimage`] on mismatch. Absence of a preimage
    /// is not an error.
    pub fn verify_preimage(&self) -> Result<()> {
        match &self.preimage {
            Some(preimage) if preimage.payment_hash() != self.identifier.payment_hash => {
                Err(Error::InvalidPreimage)
            }
            _ => Ok(()),
        }
    }

    /// `WWW-Authenticate` value for a 402 response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if the token has no payment request.
    pub fn to_challenge(&self) -> Result<String> {
        let invoice = self
            .payment_request
            .as_deref()
            .ok_or_else(|| Error::MalformedToken("token has no payment request".into()))?;
        Ok(format!(
            "{SCHEME} macaroon=\"{}\", invoice=\"{invoice}\"",
            self.encoded
        ))
    }

    /// `Authorization` value presenting this token.
    #[must_use]
    pub fn to_token(&self) -> String {
        let preimage = self.preimage.map(|p| p.to_hex()).unwrap_or_default();
        format!("{SCHEME} {}:{preimage}", self.encoded)
    }

    /// Parse an `Authorization` header value.
    ///
    /// Returns `Ok(None)` if the header uses another scheme, so the caller can
    /// treat the request as carrying no token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] or [`Error::MalformedIdentifier`] if
    /// the header uses the LSAT scheme but cannot be decoded.
    pub fn from_authorization(header: &str) -> Result<Option<Self>> {
        let Some(credentials) = strip_scheme(header) else {
            return Ok(None);
        };

        let (encoded, preimage) = credentials.split_once(':').unwrap_or((credentials, ""));
        let macaroon = decode_macaroon(encoded)?;
        let mut token = Self::from_macaroon(macaroon)?;

        let preimage = preimage.trim();
        if !preimage.is_empty() {
            let preimage = preimage
                .parse::<Preimage>()
                .map_err(|e| Error::MalformedToken(format!("invalid preimage: {e}")))?;
            token = token.with_preimage(preimage);
        }
        Ok(Some(token))
    }

    /// Parse a `WWW-Authenticate` challenge, as a client would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if the scheme or either parameter
    /// is missing.
    pub fn from_challenge(header: &str) -> Result<Self> {
        let params = strip_scheme(header)
            .ok_or_else(|| Error::MalformedToken("not an LSAT challenge".into()))?;

        let mut macaroon = None;
        let mut invoice = None;
        for param in params.split(',') {
            let Some((key, value)) = param.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "macaroon" => macaroon = Some(value),
                "invoice" => invoice = Some(value),
                _ => {}
            }
        }

        let macaroon = macaroon.ok_or_else(|| Error::MalformedToken("challenge without macaroon".into()))?;
        let invoice = invoice.ok_or_else(|| Error::MalformedToken("challenge without invoice".into()))?;
        Ok(Self::from_macaroon(decode_macaroon(macaroon)?)?.with_payment_request(invoice))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
            && self.payment_request == other.payment_request
            && self.preimage == other.preimage
    }
}

impl Eq for Token {}

/// Serialize a macaroon for transport.
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] if the macaroon cannot be serialized.
pub fn encode_macaroon(macaroon: &Macaroon) -> Result<String> {
    let serialized = macaroon
        .serialize(Format::V2)
        .map_err(|e| Error::MalformedToken(format!("cannot serialize macaroon: {e:?}")))?;
    Ok(STANDARD.encode(decode_base64(&serialized)?))
}

/// Parse a transported macaroon. Only the v2 binary layout is accepted.
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] if decoding or parsing fails.
pub fn decode_macaroon(encoded: &str) -> Result<Macaroon> {
    let bytes = decode_base64(encoded)?;
    if bytes.first() != Some(&MACAROON_V2) {
        return Err(Error::MalformedToken("unsupported macaroon format".into()));
    }
    Macaroon::deserialize(&URL_SAFE.encode(&bytes))
        .map_err(|e| Error::MalformedToken(format!("invalid macaroon: {e:?}")))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    let encoded = encoded.trim();
    STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')))
        .map_err(|e| Error::MalformedToken(format!("invalid base64: {e}")))
}

fn strip_scheme(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(' ')?;
    (scheme.eq_ignore_ascii_case(SCHEME) || scheme.eq_ignore_ascii_case(SCHEME_L402))
        .then(|| rest.trim())
}
