//! Authorization middleware.
//!
//! Per-request state machine:
//!
//! ```text
//! NoToken ──────────────────► ChallengeIssued (402 + invoice)
//!    │
//!    └─ bad amount, gateway down ──► Denied
//!
//! TokenPresentUnverified ──► Granted (next handler runs)
//!    │
//!    └─ any check fails ──────────► Denied
//! ```
//!
//! A token is granted only if its signature chain validates against the
//! minting secret, its invoice is settled and every caveat holds for the
//! live request. Nothing the client sends is trusted beyond that.

use crate::caveat::{
    Caveat, CaveatRegistry, ExpirationVerifier, OriginVerifier, TimeCaveatPolicy,
    VerificationContext, EXPIRATION_CONDITION, ORIGIN_CONDITION, TIME_CONDITION,
};
use crate::config::{GateConfig, PricingConfig};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GateEvent, GateEventsChannel, GateEventsSender};
use crate::gateway::{InvoiceGateway, SettledInvoiceCache};
use crate::identifier::Identifier;
use crate::invoice::{Invoice, PaymentHash};
use crate::minter::{origin_provider, CaveatProvider, Minter};
use crate::request::RequestContext;
use crate::secret::MintingSecret;
use crate::token::Token;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Position of a request in the authorization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No LSAT credentials on the request.
    NoToken,
    /// A 402 challenge was produced.
    ChallengeIssued,
    /// Credentials present, checks pending.
    TokenPresentUnverified,
    /// All checks passed.
    Granted,
    /// Some check failed.
    Denied,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoToken => "no_token",
            Self::ChallengeIssued => "challenge_issued",
            Self::TokenPresentUnverified => "token_present_unverified",
            Self::Granted => "granted",
            Self::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// Proof of access attached to request extensions for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Identifier of the accepted token.
    pub identifier: Identifier,
    /// Settled invoice backing the token.
    pub invoice: Invoice,
    /// Caveats that were verified.
    pub caveats: Vec<Caveat>,
}

/// Result of running a request through the gate.
#[derive(Debug)]
pub enum Outcome {
    /// Respond 402 with this freshly minted token.
    Challenge(Token),
    /// Let the request through.
    Granted(Grant),
    /// Refuse the request.
    Denied(Error),
}

/// Registry with the built-in verifiers for `time`, `expiration` and,
/// when `origin` is set, `ip`.
#[must_use]
pub fn default_registry(time_policy: TimeCaveatPolicy, origin: bool) -> CaveatRegistry {
    let registry = CaveatRegistry::new()
        .with(TIME_CONDITION, time_policy)
        .with(EXPIRATION_CONDITION, ExpirationVerifier);
    if origin {
        registry.with(ORIGIN_CONDITION, OriginVerifier)
    } else {
        registry
    }
}

/// The authorization gate shared by all requests.
pub struct Gate {
    minter: Minter,
    registry: CaveatRegistry,
    gateway: Arc<dyn InvoiceGateway>,
    cache: SettledInvoiceCache,
    pricing: PricingConfig,
    events_tx: GateEventsSender,
}

impl Gate {
    /// Assemble a gate from its parts.
    #[must_use]
    pub fn new(
        minter: Minter,
        registry: CaveatRegistry,
        gateway: Arc<dyn InvoiceGateway>,
        pricing: PricingConfig,
    ) -> Self {
        let (events_tx, _) = create_event_channel();
        Self {
            minter,
            registry,
            gateway,
            cache: SettledInvoiceCache::new(),
            pricing,
            events_tx,
        }
    }

    /// Gate wired the way `config` describes.
    #[must_use]
    pub fn from_config(
        config: &GateConfig,
        secret: MintingSecret,
        gateway: Arc<dyn InvoiceGateway>,
    ) -> Self {
        let time_policy = TimeCaveatPolicy::new(config.pricing.seconds_per_unit);
        let mut providers: Vec<CaveatProvider> = config
            .caveats
            .static_caveats
            .iter()
            .cloned()
            .map(CaveatProvider::Static)
            .collect();
        if config.caveats.origin {
            providers.push(origin_provider());
        }
        let minter = Minter::new(secret, time_policy)
            .with_location(config.location.clone())
            .with_providers(providers);
        let registry = default_registry(time_policy, config.caveats.origin);

        Self::new(minter, registry, gateway, config.pricing.clone())
            .with_cache(SettledInvoiceCache::with_capacity(config.gateway.cache_capacity))
    }

    /// Replace the settled-invoice cache.
    #[must_use]
    pub fn with_cache(mut self, cache: SettledInvoiceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the minter, e.g. to override its caveat providers.
    #[must_use]
    pub fn with_minter(mut self, minter: Minter) -> Self {
        self.minter = minter;
        self
    }

    /// Replace the caveat registry.
    #[must_use]
    pub fn with_registry(mut self, registry: CaveatRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Token minter.
    #[must_use]
    pub const fn minter(&self) -> &Minter {
        &self.minter
    }

    /// Caveat registry.
    #[must_use]
    pub const fn registry(&self) -> &CaveatRegistry {
        &self.registry
    }

    /// Settled-invoice cache.
    #[must_use]
    pub const fn cache(&self) -> &SettledInvoiceCache {
        &self.cache
    }

    /// Subscribe to gate events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    pub(crate) fn events_sender(&self) -> GateEventsSender {
        self.events_tx.clone()
    }

    fn emit(&self, event: GateEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    /// Amount to invoice: the `amount` query parameter, else the configured price.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] if the value is not a number or lies
    /// outside `[min_amount, max_amount]`.
    pub fn requested_amount(&self, ctx: &RequestContext) -> Result<u64> {
        let amount = match ctx.amount.as_deref() {
            None => self.pricing.price,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::InvalidAmount(format!("'{raw}' is not a number")))?,
        };

        if amount < self.pricing.min_amount || amount > self.pricing.max_amount {
            return Err(Error::InvalidAmount(format!(
                "{amount} outside [{}, {}]",
                self.pricing.min_amount, self.pricing.max_amount
            )));
        }
        Ok(amount)
    }

    /// Create an invoice and mint a token for it.
    ///
    /// The gateway call runs on its own task: if the client disconnects the
    /// invoice is still created, and the result is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`], [`Error::GatewayUnavailable`] or
    /// [`Error::CaveatProviderError`].
    pub async fn challenge(&self, ctx: &RequestContext) -> Result<Token> {
        let amount = self.requested_amount(ctx)?;
        let expiry = i64::try_from(self.pricing.invoice_expiry_secs).unwrap_or(i64::MAX);
        let expires_at = Duration::try_seconds(expiry)
            .and_then(|expiry| Utc::now().checked_add_signed(expiry));

        let gateway = Arc::clone(&self.gateway);
        let description = self.pricing.description.clone();
        let invoice = tokio::spawn(async move {
            gateway
                .create_invoice(amount, &description, expires_at)
                .await
        })
        .await
        .map_err(|e| Error::GatewayUnavailable(format!("invoice task failed: {e}")))??;

        let token = self.minter.mint(&invoice, ctx)?;
        self.emit(GateEvent::ChallengeIssued {
            payment_hash: invoice.payment_hash,
            amount,
        });
        Ok(token)
    }

    /// Current invoice state, served from the cache once settled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvoiceNotFound`] or [`Error::GatewayUnavailable`].
    pub async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<Invoice> {
        if let Some(invoice) = self.cache.get(payment_hash) {
            debug!("Settled invoice {} served from cache", payment_hash);
            return Ok(invoice);
        }

        let invoice = self.gateway.get_invoice(payment_hash).await?;
        if self.cache.insert(&invoice) {
            debug!("Cached settled invoice {}", payment_hash);
        }
        Ok(invoice)
    }

    /// Check a presented token against the live request.
    ///
    /// # Errors
    ///
    /// Returns the first failing check, in order: signature, preimage,
    /// invoice lookup, settlement, caveats.
    pub async fn verify(&self, token: &Token, ctx: &RequestContext) -> Result<Grant> {
        self.minter.verify_signature(token)?;
        token.verify_preimage()?;
        let caveats = token.caveats()?;

        let invoice = self.lookup_invoice(token.payment_hash()).await?;
        if !invoice.is_settled() {
            return Err(Error::InvoiceUnsettled(invoice.payment_hash.to_hex()));
        }

        let verification = VerificationContext {
            now: Utc::now(),
            origin: ctx.origin().ok(),
            invoice,
            path: ctx.path.clone(),
        };
        self.registry.verify_all(&caveats, &verification)?;

        Ok(Grant {
            identifier: *token.identifier(),
            invoice: verification.invoice,
            caveats,
        })
    }

    /// Token and invoice state for a presented token, without requiring
    /// payment. Backs the invoice status route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`] if no LSAT credentials are present,
    /// plus any error from signature checking or invoice lookup.
    pub async fn inspect(&self, authorization: Option<&str>) -> Result<(Token, Invoice)> {
        let token = authorization
            .map(Token::from_authorization)
            .transpose()?
            .flatten()
            .ok_or_else(|| Error::MalformedToken("no LSAT credentials".into()))?;
        self.minter.verify_signature(&token)?;
        let invoice = self.lookup_invoice(token.payment_hash()).await?;
        Ok((token, invoice))
    }

    /// Run a request through the state machine.
    pub async fn authorize(&self, ctx: &RequestContext, authorization: Option<&str>) -> Outcome {
        let token = match authorization.map(Token::from_authorization).transpose() {
            Ok(token) => token.flatten(),
            Err(e) => return self.deny(ctx, None, e),
        };

        let Some(token) = token else {
            debug!("{} {} -> {}", ctx.method, ctx.path, GateState::NoToken);
            return match self.challenge(ctx).await {
                Ok(token) => {
                    debug!("{} {} -> {}", ctx.method, ctx.path, GateState::ChallengeIssued);
                    Outcome::Challenge(token)
                }
                Err(e) => self.deny(ctx, None, e),
            };
        };

        debug!(
            "{} {} -> {} ({})",
            ctx.method,
            ctx.path,
            GateState::TokenPresentUnverified,
            token.payment_hash()
        );
        match self.verify(&token, ctx).await {
            Ok(grant) => {
                info!(
                    "{} {} -> {} ({})",
                    ctx.method,
                    ctx.path,
                    GateState::Granted,
                    grant.invoice.payment_hash
                );
                self.emit(GateEvent::AccessGranted {
                    payment_hash: grant.invoice.payment_hash,
                    path: ctx.path.clone(),
                });
                Outcome::Granted(grant)
            }
            Err(e) => self.deny(ctx, Some(*token.payment_hash()), e),
        }
    }

    fn deny(&self, ctx: &RequestContext, payment_hash: Option<PaymentHash>, error: Error) -> Outcome {
        warn!(
            "{} {} -> {}: {}",
            ctx.method,
            ctx.path,
            GateState::Denied,
            error
        );
        self.emit(GateEvent::AccessDenied {
            payment_hash,
            reason: error.reason_code(),
        });
        Outcome::Denied(error)
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("minter", &self.minter)
            .field("registry", &self.registry)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChallengeBody {
    error: &'static str,
}

/// 402 response carrying the challenge header.
#[must_use]
pub fn challenge_response(token: &Token) -> Response {
    let header = match token.to_challenge() {
        Ok(header) => header,
        Err(e) => return e.into_response(),
    };
    let Ok(value) = HeaderValue::from_str(&header) else {
        return Error::MalformedToken("challenge is not a valid header".into()).into_response();
    };

    let body = ChallengeBody {
        error: "payment_required",
    };
    let mut response = (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
    response.headers_mut().insert(WWW_AUTHENTICATE, value);
    response
}

/// Axum middleware putting `gate` in front of the wrapped routes.
///
/// ```ignore
/// Router::new()
///     .route("/protected", get(handler))
///     .route_layer(axum::middleware::from_fn_with_state(gate, lsat_middleware))
/// ```
pub async fn lsat_middleware(State(gate): State<Arc<Gate>>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts);

    let authorization = match parts.headers.get(AUTHORIZATION).map(HeaderValue::to_str) {
        None => None,
        Some(Ok(value)) => Some(value.to_string()),
        Some(Err(_)) => {
            return Error::MalformedToken("authorization header is not ascii".into())
                .into_response();
        }
    };

    match gate.authorize(&ctx, authorization.as_deref()).await {
        Outcome::Challenge(token) => challenge_response(&token),
        Outcome::Denied(error) => error.into_response(),
        Outcome::Granted(grant) => {
            parts.extensions.insert(grant);
            next.run(Request::from_parts(parts, body)).await
        }
    }
}
