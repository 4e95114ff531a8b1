//! Error types for lsat-gate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while minting or verifying tokens.
///
/// Every variant maps to a stable reason code and HTTP status through
/// [`Error::reason_code`] and [`Error::status_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// Identifier bytes had the wrong length or an unsupported version.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// The LSAT header or the macaroon inside it could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The macaroon signature chain does not validate against the minting secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The presented preimage does not hash to the token's payment hash.
    #[error("preimage does not match payment hash")]
    InvalidPreimage,

    /// The gateway has no invoice for the payment hash.
    #[error("invoice not found: {0}")]
    InvoiceNotFound(String),

    /// The invoice exists but has not been paid yet.
    #[error("invoice {0} is not settled")]
    InvoiceUnsettled(String),

    /// A caveat names a condition with no registered verifier.
    #[error("unknown caveat condition: {0}")]
    UnknownCaveat(String),

    /// A caveat verifier rejected the request.
    #[error("caveat '{condition}' violated: {reason}")]
    CaveatViolated {
        /// Condition of the failing caveat.
        condition: String,
        /// Verifier-supplied explanation.
        reason: String,
    },

    /// No usable client address could be determined for the request.
    #[error("origin unresolved: {0}")]
    OriginUnresolved(String),

    /// The payment node could not be reached or timed out.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Requested amount is not a number or is outside the configured range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A configured caveat provider failed while minting.
    #[error("caveat provider failed: {0}")]
    CaveatProviderError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code returned to clients.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier(_) => "malformed_identifier",
            Self::MalformedToken(_) => "malformed_token",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidPreimage => "invalid_preimage",
            Self::InvoiceNotFound(_) => "invoice_not_found",
            Self::InvoiceUnsettled(_) => "invoice_unsettled",
            Self::UnknownCaveat(_) => "unknown_caveat",
            Self::CaveatViolated { .. } => "caveat_violated",
            Self::OriginUnresolved(_) => "origin_unresolved",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::CaveatProviderError(_) => "caveat_provider_error",
            Self::Config(_) | Self::Io(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    ///
    /// - Malformed input and bad amounts: 400
    /// - Unpaid invoice: 402
    /// - Token not valid for this server: 401
    /// - Caveat failures: 403
    /// - Gateway failures: 503
    /// - Anything else: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedIdentifier(_)
            | Self::MalformedToken(_)
            | Self::InvalidAmount(_)
            | Self::OriginUnresolved(_) => StatusCode::BAD_REQUEST,
            Self::InvoiceUnsettled(_) => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidSignature | Self::InvalidPreimage | Self::InvoiceNotFound(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::UnknownCaveat(_) | Self::CaveatViolated { .. } => StatusCode::FORBIDDEN,
            Self::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::CaveatProviderError(_) | Self::Config(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Only the reason code leaves the process; details stay in the logs.
        let body = ErrorBody {
            error: self.reason_code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::MalformedToken("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvoiceUnsettled("ab".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(Error::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::UnknownCaveat("foo".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::CaveatViolated {
                condition: "time".into(),
                reason: "expired".into()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::GatewayUnavailable("timeout".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::InvalidAmount("0".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_responses_do_not_leak_details() {
        let response = Error::GatewayUnavailable("lnd at 10.0.0.7 refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let display = Error::GatewayUnavailable("x".into()).reason_code();
        assert_eq!(display, "gateway_unavailable");
    }
}
