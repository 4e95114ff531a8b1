//! Caveat registry mapping condition names to verifiers.

use super::{Caveat, VerificationContext};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Outcome of checking one caveat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request satisfies the caveat.
    Satisfied,
    /// The request violates the caveat.
    Violated {
        /// Why the caveat failed.
        reason: String,
    },
}

impl Verdict {
    /// Shorthand for a violation.
    pub fn violated(reason: impl Into<String>) -> Self {
        Self::Violated {
            reason: reason.into(),
        }
    }

    /// Whether the caveat held.
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Checks caveats of one condition against a request.
///
/// Implemented for plain closures so callers can register ad-hoc verifiers.
pub trait CaveatVerifier: Send + Sync {
    /// Evaluate `caveat` against `ctx`.
    fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict;
}

impl<F> CaveatVerifier for F
where
    F: Fn(&Caveat, &VerificationContext) -> Verdict + Send + Sync,
{
    fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict {
        self(caveat, ctx)
    }
}

/// Registry of caveat verifiers keyed by condition.
///
/// Immutable once the gate is built; shared between requests.
#[derive(Clone, Default)]
pub struct CaveatRegistry {
    verifiers: HashMap<String, Arc<dyn CaveatVerifier>>,
}

impl CaveatRegistry {
    /// Empty registry. Every caveat fails against it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the verifier for `condition`.
    pub fn register(&mut self, condition: impl Into<String>, verifier: impl CaveatVerifier + 'static) {
        self.verifiers.insert(condition.into(), Arc::new(verifier));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, condition: impl Into<String>, verifier: impl CaveatVerifier + 'static) -> Self {
        self.register(condition, verifier);
        self
    }

    /// Whether a verifier exists for `condition`.
    #[must_use]
    pub fn contains(&self, condition: &str) -> bool {
        self.verifiers.contains_key(condition)
    }

    /// Check a single caveat. Unknown conditions are violations.
    #[must_use]
    pub fn verify(&self, caveat: &Caveat, ctx: &VerificationContext) -> Verdict {
        match self.verifiers.get(&caveat.condition) {
            Some(verifier) => verifier.verify(caveat, ctx),
            None => Verdict::violated(format!("no verifier for '{}'", caveat.condition)),
        }
    }

    /// Check every caveat; all must hold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCaveat`] for the first unregistered condition,
    /// otherwise [`Error::CaveatViolated`] for the first failing caveat.
    pub fn verify_all(&self, caveats: &[Caveat], ctx: &VerificationContext) -> Result<()> {
        // Unknown conditions win over ordinary violations, wherever they sit.
        if let Some(unknown) = caveats.iter().find(|c| !self.contains(&c.condition)) {
            return Err(Error::UnknownCaveat(unknown.condition.clone()));
        }

        for caveat in caveats {
            if let Verdict::Violated { reason } = self.verify(caveat, ctx) {
                debug!("Caveat {} violated: {}", caveat, reason);
                return Err(Error::CaveatViolated {
                    condition: caveat.condition.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CaveatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut conditions: Vec<_> = self.verifiers.keys().collect();
        conditions.sort();
        f.debug_struct("CaveatRegistry")
            .field("conditions", &conditions)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::invoice::{Invoice, PaymentHash};
    use chrono::Utc;
    use proptest::prelude::*;

    fn ctx() -> VerificationContext {
        VerificationContext {
            now: Utc::now(),
            origin: None,
            invoice: Invoice {
                payment_hash: PaymentHash([1; 32]),
                payment_request: "lnbc".into(),
                amount_requested: 1,
                amount_paid: Some(1),
                created_at: Utc::now(),
                settled_at: Some(Utc::now()),
                expires_at: None,
                description: String::new(),
            },
            path: "/protected".into(),
        }
    }

    fn registry() -> CaveatRegistry {
        CaveatRegistry::new()
            .with("allow", |_: &Caveat, _: &VerificationContext| Verdict::Satisfied)
            .with("deny", |_: &Caveat, _: &VerificationContext| {
                Verdict::violated("always denies")
            })
            .with("path", |c: &Caveat, ctx: &VerificationContext| {
                if c.value == ctx.path {
                    Verdict::Satisfied
                } else {
                    Verdict::violated("wrong path")
                }
            })
    }

    #[test]
    fn test_all_satisfied() {
        let caveats = vec![Caveat::new("allow", "x"), Caveat::new("path", "/protected")];
        assert!(registry().verify_all(&caveats, &ctx()).is_ok());
        assert!(registry().verify_all(&[], &ctx()).is_ok());
    }

    #[test]
    fn test_single_violation_denies() {
        let caveats = vec![Caveat::new("allow", "x"), Caveat::new("path", "/other")];
        let err = registry().verify_all(&caveats, &ctx()).unwrap_err();
        assert!(matches!(err, Error::CaveatViolated { ref condition, .. } if condition == "path"));
    }

    #[test]
    fn test_unknown_condition_fails_closed() {
        let caveats = vec![Caveat::new("allow", "x"), Caveat::new("middleName", "danger")];
        let err = registry().verify_all(&caveats, &ctx()).unwrap_err();
        assert!(matches!(err, Error::UnknownCaveat(ref c) if c == "middleName"));

        assert!(!registry()
            .verify(&Caveat::new("middleName", "danger"), &ctx())
            .is_satisfied());
        assert!(CaveatRegistry::new()
            .verify_all(&[Caveat::new("allow", "x")], &ctx())
            .is_err());
    }

    #[test]
    fn test_unknown_condition_reported_before_violation() {
        let caveats = vec![Caveat::new("deny", "x"), Caveat::new("mystery", "y")];
        let err = registry().verify_all(&caveats, &ctx()).unwrap_err();
        assert!(matches!(err, Error::UnknownCaveat(_)));
    }

    fn any_caveat() -> impl Strategy<Value = Caveat> {
        prop_oneof![
            Just(Caveat::new("allow", "x")),
            Just(Caveat::new("deny", "x")),
            Just(Caveat::new("path", "/protected")),
            Just(Caveat::new("path", "/other")),
            Just(Caveat::new("mystery", "x")),
        ]
    }

    proptest! {
        // Appending a caveat never turns a denial into a grant.
        #[test]
        fn prop_attenuation_never_widens(
            base in proptest::collection::vec(any_caveat(), 0..5),
            extra in any_caveat(),
        ) {
            let reg = registry();
            let before = reg.verify_all(&base, &ctx()).is_ok();
            let mut extended = base.clone();
            extended.push(extra);
            let after = reg.verify_all(&extended, &ctx()).is_ok();
            prop_assert!(!after || before);
        }
    }
}
