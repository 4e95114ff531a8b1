//! Caveats: named predicates that narrow what a token authorizes.
//!
//! Caveats travel inside the macaroon as `<condition><op><value>` strings, e.g.
//! `time=1` or `expiration<1700000000`. Verification is conjunctive and
//! fail-closed: every caveat needs a registered verifier and every verifier
//! must be satisfied.

mod builtin;
mod registry;

pub use builtin::{
    ExpirationVerifier, OriginVerifier, TimeCaveatPolicy, EXPIRATION_CONDITION, ORIGIN_CONDITION,
    TIME_CONDITION,
};
pub use registry::{CaveatRegistry, CaveatVerifier, Verdict};

use crate::error::{Error, Result};
use crate::invoice::Invoice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Comparison operator between a caveat's condition and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// `=`
    #[default]
    Equal,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl Comparator {
    /// Operator text.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    /// Whether `actual <op> bound` holds.
    #[must_use]
    pub fn holds<T: Ord>(self, actual: &T, bound: &T) -> bool {
        match self {
            Self::Equal => actual == bound,
            Self::Less => actual < bound,
            Self::LessOrEqual => actual <= bound,
            Self::Greater => actual > bound,
            Self::GreaterOrEqual => actual >= bound,
        }
    }
}

/// A single predicate attached to a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caveat {
    /// Condition name used to look up the verifier.
    pub condition: String,
    /// Operator relating the condition to the value.
    pub comparator: Comparator,
    /// Condition-specific value.
    pub value: String,
}

impl Caveat {
    /// Equality caveat `condition=value`.
    pub fn new(condition: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            comparator: Comparator::Equal,
            value: value.into(),
        }
    }

    /// Caveat with an explicit comparator.
    pub fn with_comparator(
        condition: impl Into<String>,
        comparator: Comparator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            condition: condition.into(),
            comparator,
            value: value.into(),
        }
    }

    /// Encoded form stored in the macaroon.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a caveat from its encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if no operator is present or the
    /// condition is empty.
    pub fn decode(encoded: &str) -> Result<Self> {
        encoded.parse()
    }
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.condition, self.comparator.as_str(), self.value)
    }
}

impl Serialize for Caveat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Caveat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Caveat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let idx = s
            .find(&['=', '<', '>'][..])
            .ok_or_else(|| Error::MalformedToken(format!("caveat without operator: {s}")))?;
        let condition = s[..idx].trim();
        if condition.is_empty() {
            return Err(Error::MalformedToken(format!("caveat without condition: {s}")));
        }

        let rest = &s[idx..];
        let (comparator, len) = if rest.starts_with("<=") {
            (Comparator::LessOrEqual, 2)
        } else if rest.starts_with(">=") {
            (Comparator::GreaterOrEqual, 2)
        } else if rest.starts_with('<') {
            (Comparator::Less, 1)
        } else if rest.starts_with('>') {
            (Comparator::Greater, 1)
        } else {
            (Comparator::Equal, 1)
        };

        Ok(Self {
            condition: condition.to_string(),
            comparator,
            value: rest[len..].trim().to_string(),
        })
    }
}

/// Request-derived facts available to caveat verifiers.
///
/// Built fresh for every verification and never mutated by verifiers.
#[derive(Debug, Clone)]
pub struct VerificationContext {
    /// Time of the request.
    pub now: DateTime<Utc>,
    /// Resolved client origin, if one could be determined.
    pub origin: Option<IpAddr>,
    /// Live state of the invoice referenced by the token.
    pub invoice: Invoice,
    /// Request path.
    pub path: String,
}
