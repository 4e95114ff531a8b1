//! Test harness wiring a gate to an in-memory gateway.
//!
//! The `TestHarness` sends requests straight into the router with
//! `tower::ServiceExt::oneshot`, so no port is bound.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use lsat_gate::config::{GateConfig, GatewayBackend};
use lsat_gate::gateway::InvoiceGateway;
use lsat_gate::{router, Gate, MemoryGateway, MintingSecret, Preimage, Token};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Response captured from the router.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Body parsed as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("body is not JSON")
    }

    /// The `error` reason code of a denial body.
    pub fn error(&self) -> String {
        self.json()["error"]
            .as_str()
            .expect("body has no error code")
            .to_string()
    }

    /// `WWW-Authenticate` header, if present.
    pub fn challenge(&self) -> Option<&str> {
        self.headers
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
    }
}

/// Gate plus the in-memory gateway it talks to.
pub struct TestHarness {
    gateway: Arc<MemoryGateway>,
    gate: Arc<Gate>,
    app: Router,
}

impl TestHarness {
    /// Harness with default pricing (1 second per unit, price 10).
    pub fn setup() -> Self {
        Self::setup_with_config(GateConfig::default())
    }

    /// Harness with a custom configuration. The backend is always memory.
    pub fn setup_with_config(mut config: GateConfig) -> Self {
        config.gateway.backend = GatewayBackend::Memory;
        config.validate().expect("invalid test config");

        let gateway = Arc::new(MemoryGateway::new());
        let gate = Arc::new(Gate::from_config(
            &config,
            MintingSecret::generate(),
            Arc::clone(&gateway) as Arc<dyn InvoiceGateway>,
        ));
        let app = router(Arc::clone(&gate));

        Self { gateway, gate, app }
    }

    /// The simulated payment node.
    pub fn gateway(&self) -> &MemoryGateway {
        &self.gateway
    }

    /// The gate under test.
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Send `GET uri` with the given headers.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.get_from(uri, headers, None).await
    }

    /// Send `GET uri` as if it arrived on a connection from `peer`.
    pub async fn get_from(
        &self,
        uri: &str,
        headers: &[(&str, &str)],
        peer: Option<SocketAddr>,
    ) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            request.extensions_mut().insert(ConnectInfo(peer));
        }

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Request the protected route without credentials and parse the challenge.
    pub async fn challenge(&self, headers: &[(&str, &str)]) -> Token {
        let response = self.get("/protected", headers).await;
        assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
        let header = response.challenge().expect("402 without WWW-Authenticate");
        Token::from_challenge(header).unwrap()
    }

    /// Pay the invoice behind `token`.
    pub fn pay(&self, token: &Token, amount: u64, settled_at: DateTime<Utc>) -> Preimage {
        self.gateway
            .settle(token.payment_hash(), amount, settled_at)
            .unwrap()
    }

    /// Request the protected route presenting `token`.
    pub async fn access(&self, token: &Token, headers: &[(&str, &str)]) -> TestResponse {
        let authorization = token.to_token();
        let mut all = vec![("authorization", authorization.as_str())];
        all.extend_from_slice(headers);
        self.get("/protected", &all).await
    }
}
