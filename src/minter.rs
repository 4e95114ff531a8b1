//! Token minting.
//!
//! A minted token carries, in order:
//! 1. the rate-based `time` caveat
//! 2. the caveats of each configured [`CaveatProvider`], in provider order
//!
//! and is signed with a root key derived from the minting secret and the
//! token's identifier, so verification needs no per-token storage.

use crate::caveat::{Caveat, TimeCaveatPolicy, ORIGIN_CONDITION};
use crate::error::{Error, Result};
use crate::identifier::Identifier;
use crate::invoice::Invoice;
use crate::request::{resolve_origin, RequestContext};
use crate::secret::MintingSecret;
use crate::token::Token;
use macaroon::{ByteString, Macaroon, MacaroonKey, Verifier};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Function deriving caveats from the request being challenged.
pub type DeriveCaveat =
    dyn Fn(&RequestContext) -> std::result::Result<Vec<Caveat>, String> + Send + Sync;

/// Source of a caveat attached at mint time.
#[derive(Clone)]
pub enum CaveatProvider {
    /// The same caveat on every token.
    Static(Caveat),
    /// Caveats computed from the request.
    Derived(Arc<DeriveCaveat>),
}

impl CaveatProvider {
    /// Wrap a closure as a derived provider.
    pub fn derived(
        f: impl Fn(&RequestContext) -> std::result::Result<Vec<Caveat>, String>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self::Derived(Arc::new(f))
    }

    /// Produce the caveats for `ctx`, in the order they are attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaveatProviderError`] if a derived provider fails.
    pub fn provide(&self, ctx: &RequestContext) -> Result<Vec<Caveat>> {
        match self {
            Self::Static(caveat) => Ok(vec![caveat.clone()]),
            Self::Derived(f) => f(ctx).map_err(Error::CaveatProviderError),
        }
    }
}

impl fmt::Debug for CaveatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(caveat) => f.debug_tuple("Static").field(caveat).finish(),
            Self::Derived(_) => f.write_str("Derived(..)"),
        }
    }
}

/// Provider pinning tokens to the client origin (`ip=<addr>`).
#[must_use]
pub fn origin_provider() -> CaveatProvider {
    CaveatProvider::derived(|ctx| {
        resolve_origin(ctx)
            .map(|ip| vec![Caveat::new(ORIGIN_CONDITION, ip.to_string())])
            .map_err(|e| e.to_string())
    })
}

/// Builds base tokens for new invoices.
#[derive(Debug, Clone)]
pub struct Minter {
    secret: MintingSecret,
    location: Option<String>,
    time_policy: TimeCaveatPolicy,
    providers: Vec<CaveatProvider>,
}

impl Minter {
    /// Minter with no extra providers.
    #[must_use]
    pub fn new(secret: MintingSecret, time_policy: TimeCaveatPolicy) -> Self {
        Self {
            secret,
            location: None,
            time_policy,
            providers: Vec::new(),
        }
    }

    /// Record `location` in minted macaroons.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Replace the caveat providers. The time caveat is always attached.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<CaveatProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// Append a provider after the existing ones.
    pub fn push_provider(&mut self, provider: CaveatProvider) {
        self.providers.push(provider);
    }

    /// Configured providers, in attachment order.
    #[must_use]
    pub fn providers(&self) -> &[CaveatProvider] {
        &self.providers
    }

    /// Time policy used for the first caveat.
    #[must_use]
    pub const fn time_policy(&self) -> &TimeCaveatPolicy {
        &self.time_policy
    }

    /// Mint a token for `invoice`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaveatProviderError`] from the first failing provider;
    /// no partial token is produced.
    pub fn mint(&self, invoice: &Invoice, ctx: &RequestContext) -> Result<Token> {
        let identifier = Identifier::new(invoice.payment_hash);

        let mut caveats = Vec::with_capacity(self.providers.len() + 1);
        caveats.push(self.time_policy.caveat());
        for provider in &self.providers {
            caveats.extend(provider.provide(ctx)?);
        }

        init_crypto()?;
        let root_key = MacaroonKey::from(&self.secret.root_key(&identifier)?);
        let mut macaroon = Macaroon::create(
            self.location.clone(),
            &root_key,
            ByteString::from(identifier.encode()),
        )
        .map_err(|e| Error::MalformedToken(format!("cannot create macaroon: {e:?}")))?;
        for caveat in &caveats {
            macaroon.add_first_party_caveat(caveat.encode().as_str().into());
        }

        debug!(
            "Minted token for invoice {} with {} caveats",
            invoice.payment_hash,
            caveats.len()
        );
        Ok(Token::from_macaroon(macaroon)?.with_payment_request(invoice.payment_request.clone()))
    }

    /// Check that `token` was minted with this secret and not tampered with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the chain does not validate.
    pub fn verify_signature(&self, token: &Token) -> Result<()> {
        init_crypto()?;
        let root_key = MacaroonKey::from(&self.secret.root_key(token.identifier())?);

        // Predicates are judged by the caveat registry against the live request.
        let mut verifier = Verifier::default();
        verifier.satisfy_general(any_predicate);
        verifier
            .verify(token.macaroon(), &root_key, Vec::new())
            .map_err(|_| Error::InvalidSignature)
    }
}

fn any_predicate(_: &ByteString) -> bool {
    true
}

fn init_crypto() -> Result<()> {
    static READY: OnceLock<bool> = OnceLock::new();
    if *READY.get_or_init(|| macaroon::initialize().is_ok()) {
        Ok(())
    } else {
        Err(Error::Config("macaroon crypto backend failed to initialize".into()))
    }
}
