//! Built-in caveat verifiers.
//!
//! - `time=<seconds_per_unit>`: access lasts `amount_paid * seconds_per_unit`
//!   seconds from settlement. The caveat stores only the rate; the window is
//!   recomputed from the live invoice on every request, so a token minted
//!   before payment becomes usable as soon as the invoice settles.
//! - `expiration<unix_ts>`: absolute deadline a holder may append.
//! - `ip=<addr>`: pins the token to the client origin it was issued to.

use super::{Caveat, CaveatVerifier, Comparator, Verdict, VerificationContext};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Condition name of the rate-based time caveat.
pub const TIME_CONDITION: &str = "time";

/// Condition name of the absolute expiration caveat.
pub const EXPIRATION_CONDITION: &str = "expiration";

/// Condition name of the client origin caveat.
pub const ORIGIN_CONDITION: &str = "ip";

/// Time-limited access proportional to the amount paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCaveatPolicy {
    seconds_per_unit: u64,
}

impl TimeCaveatPolicy {
    /// Policy granting `seconds_per_unit` seconds per paid unit (minimum 1).
    #[must_use]
    pub fn new(seconds_per_unit: u64) -> Self {
        Self {
            seconds_per_unit: seconds_per_unit.max(1),
        }
    }

    /// Configured rate.
    #[must_use]
    pub const fn seconds_per_unit(&self) -> u64 {
        self.seconds_per_unit
    }

    /// Caveat attached at mint time.
    #[must_use]
    pub fn caveat(&self) -> Caveat {
        Caveat::new(TIME_CONDITION, self.seconds_per_unit.to_string())
    }
}

impl CaveatVerifier for TimeCaveatPolicy {
    fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict {
        if caveat.comparator != Comparator::Equal {
            return Verdict::violated(format!(
                "unsupported comparator '{}'",
                caveat.comparator.as_str()
            ));
        }
        // The rate comes from the caveat, not the policy: tokens minted under
        // an older rate keep the window they were sold with.
        let Ok(rate) = caveat.value.parse::<u64>() else {
            return Verdict::violated(format!("invalid rate '{}'", caveat.value));
        };
        let Some(valid_until) = ctx.invoice.access_until(rate) else {
            return Verdict::violated("invoice not settled");
        };
        if ctx.now > valid_until {
            Verdict::violated(format!("access expired at {}", valid_until.to_rfc3339()))
        } else {
            Verdict::Satisfied
        }
    }
}

/// Absolute deadline, usually appended by a holder to narrow a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationVerifier;

impl CaveatVerifier for ExpirationVerifier {
    fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict {
        let Some(bound) = caveat
            .value
            .parse::<i64>()
            .ok()
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        else {
            return Verdict::violated(format!("invalid timestamp '{}'", caveat.value));
        };
        if caveat.comparator.holds(&ctx.now, &bound) {
            Verdict::Satisfied
        } else {
            Verdict::violated(format!(
                "now {} {} {} does not hold",
                ctx.now.timestamp(),
                caveat.comparator.as_str(),
                bound.timestamp()
            ))
        }
    }
}

/// Requires the request to come from the origin recorded in the caveat.
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginVerifier;

impl CaveatVerifier for OriginVerifier {
    fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict {
        if caveat.comparator != Comparator::Equal {
            return Verdict::violated("origin caveats only support '='");
        }
        let Ok(expected) = caveat.value.parse::<IpAddr>() else {
            return Verdict::violated(format!("invalid origin '{}'", caveat.value));
        };
        match ctx.origin {
            Some(origin) if origin == expected => Verdict::Satisfied,
            Some(origin) => Verdict::violated(format!("origin {origin} does not match")),
            None => Verdict::violated("request origin unresolved"),
        }
    }
}
