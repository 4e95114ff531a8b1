//! Normalized view of an incoming request and client origin resolution.

use crate::error::{Error, Result};
use axum::extract::{ConnectInfo, Query};
use axum::http::request::Parts;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Proxy header listing the client and intermediate proxies.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Header carrying the client address as resolved by a trusted front proxy.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Request facts captured once at the HTTP boundary.
///
/// Caveat providers and origin resolution work on this struct, never on the
/// raw framework request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Raw `X-Forwarded-For` value.
    pub forwarded_for: Option<String>,
    /// Address resolved by the framework or a front proxy.
    pub resolved_ip: Option<String>,
    /// Peer address of the TCP connection.
    pub remote_addr: Option<SocketAddr>,
    /// Amount requested through the `amount` query parameter.
    pub amount: Option<String>,
}

impl RequestContext {
    /// Capture the relevant parts of an axum request.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let amount = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(mut params)| params.remove("amount"));

        Self {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            forwarded_for: header(FORWARDED_FOR_HEADER),
            resolved_ip: header(REAL_IP_HEADER),
            remote_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            amount,
        }
    }

    /// Client origin, see [`resolve_origin`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::OriginUnresolved`] if no valid address is available.
    pub fn origin(&self) -> Result<IpAddr> {
        resolve_origin(self)
    }
}

/// Resolve the client address of a request.
///
/// Precedence: first entry of `X-Forwarded-For`, then the framework-resolved
/// address, then the connection's peer address. The first present source is
/// used even if it turns out invalid; there is no fallthrough on bad input.
///
/// # Errors
///
/// Returns [`Error::OriginUnresolved`] if no source is present or the chosen
/// value is not an IP address.
pub fn resolve_origin(ctx: &RequestContext) -> Result<IpAddr> {
    let candidate = if let Some(forwarded) = &ctx.forwarded_for {
        forwarded.split(',').next().unwrap_or_default().trim().to_string()
    } else if let Some(resolved) = &ctx.resolved_ip {
        resolved.trim().to_string()
    } else if let Some(addr) = ctx.remote_addr {
        return Ok(addr.ip());
    } else {
        return Err(Error::OriginUnresolved("no client address available".into()));
    };

    candidate
        .parse()
        .map_err(|_| Error::OriginUnresolved(format!("'{candidate}' is not an IP address")))
}
