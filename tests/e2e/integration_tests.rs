//! Challenge, payment and access flows through the HTTP surface.

use super::TestHarness;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use lsat_gate::config::GateConfig;
use lsat_gate::gateway::InvoiceGateway;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lsat_gate::token::{decode_macaroon, encode_macaroon};
use lsat_gate::{Caveat, Comparator, Preimage, Token};
use macaroon::{ByteString, Macaroon, MacaroonKey};

const CLIENT_IP: &str = "182.39.28.11";

#[tokio::test]
async fn test_public_route_needs_no_token() {
    let harness = TestHarness::setup();
    let response = harness.get("/", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(harness.gateway().is_empty());
}

#[tokio::test]
async fn test_pay_then_access() {
    let harness = TestHarness::setup();

    let response = harness.get("/protected", &[]).await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response.error(), "payment_required");
    let challenge = response.challenge().unwrap();
    assert!(challenge.starts_with("LSAT macaroon=\""));
    assert!(challenge.contains("invoice=\"lnbcrt10n1p"));

    let token = Token::from_challenge(challenge).unwrap();
    assert_eq!(token.caveats().unwrap(), vec![Caveat::new("time", "1")]);

    let preimage = harness.pay(&token, 10, Utc::now());
    let response = harness.access(&token.clone().with_preimage(preimage), &[]).await;
    assert_eq!(response.status, StatusCode::OK);

    let body = response.json();
    assert_eq!(body["message"], "access granted");
    assert_eq!(body["payment_hash"], token.payment_hash().to_hex());
    assert!(body["access_until"].is_string());
}

#[tokio::test]
async fn test_access_without_preimage_once_settled() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now());

    let response = harness.access(&token, &[]).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unpaid_token_gets_402() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;

    let response = harness.access(&token, &[]).await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response.error(), "invoice_unsettled");
    assert!(response.challenge().is_none());
}

#[tokio::test]
async fn test_access_window_tracks_amount_paid() {
    let harness = TestHarness::setup();

    // 10 units at 1 second per unit: still inside the window after 5 seconds
    let fresh = harness.challenge(&[]).await;
    harness.pay(&fresh, 10, Utc::now() - Duration::seconds(5));
    assert_eq!(harness.access(&fresh, &[]).await.status, StatusCode::OK);

    // and outside it after 11
    let stale = harness.challenge(&[]).await;
    harness.pay(&stale, 10, Utc::now() - Duration::seconds(11));
    let response = harness.access(&stale, &[]).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "caveat_violated");
}

#[tokio::test]
async fn test_rate_from_config() {
    let mut config = GateConfig::default();
    config.pricing.seconds_per_unit = 60;
    let harness = TestHarness::setup_with_config(config);

    let token = harness.challenge(&[]).await;
    assert_eq!(token.caveats().unwrap(), vec![Caveat::new("time", "60")]);

    // 10 units at 60 seconds per unit last ten minutes
    harness.pay(&token, 10, Utc::now() - Duration::minutes(9));
    assert_eq!(harness.access(&token, &[]).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_each_challenge_has_fresh_invoice() {
    let harness = TestHarness::setup();
    let first = harness.challenge(&[]).await;
    let second = harness.challenge(&[]).await;

    assert_ne!(first.payment_hash(), second.payment_hash());
    assert_ne!(first.identifier().token_id, second.identifier().token_id);
    assert_eq!(harness.gateway().len(), 2);
}

#[tokio::test]
async fn test_requested_amount() {
    let harness = TestHarness::setup();

    let response = harness.get("/protected?amount=50", &[]).await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    let token = Token::from_challenge(response.challenge().unwrap()).unwrap();
    let invoice = harness
        .gateway()
        .get_invoice(token.payment_hash())
        .await
        .unwrap();
    assert_eq!(invoice.amount_requested, 50);

    for bad in ["0", "abc", "5000000"] {
        let response = harness.get(&format!("/protected?amount={bad}"), &[]).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "amount {bad}");
        assert_eq!(response.error(), "invalid_amount");
    }
    assert_eq!(harness.gateway().len(), 1);
}

#[tokio::test]
async fn test_percent_encoded_amount() {
    let harness = TestHarness::setup();

    let response = harness.get("/protected?amount=%31%30", &[]).await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    let token = Token::from_challenge(response.challenge().unwrap()).unwrap();
    let invoice = harness
        .gateway()
        .get_invoice(token.payment_hash())
        .await
        .unwrap();
    assert_eq!(invoice.amount_requested, 10);
}

#[tokio::test]
async fn test_unknown_caveat_fails_closed() {
    let harness = TestHarness::setup();
    let mut token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now());
    token.add_caveat(&Caveat::new("service", "weather")).unwrap();

    let response = harness.access(&token, &[]).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "unknown_caveat");
}

#[tokio::test]
async fn test_holder_expiration_narrows_access() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 100, Utc::now());

    let mut narrowed = token.clone();
    let future = (Utc::now() + Duration::minutes(5)).timestamp().to_string();
    narrowed
        .add_caveat(&Caveat::with_comparator("expiration", Comparator::Less, future))
        .unwrap();
    assert_eq!(harness.access(&narrowed, &[]).await.status, StatusCode::OK);

    let past = (Utc::now() - Duration::minutes(5)).timestamp().to_string();
    narrowed
        .add_caveat(&Caveat::with_comparator("expiration", Comparator::Less, past))
        .unwrap();
    let response = harness.access(&narrowed, &[]).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "caveat_violated");

    // The original token is unaffected.
    assert_eq!(harness.access(&token, &[]).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_stripped_caveat_invalidates_signature() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now() - Duration::hours(1));

    // Rebuild the macaroon without its time caveat, keeping the signature.
    // The v2 layout ends with the 32-byte signature.
    let minted = STANDARD.decode(token.encoded_macaroon()).unwrap();
    let bare = Macaroon::create(
        None,
        &MacaroonKey::from(&[0u8; 32]),
        ByteString::from(token.identifier().encode()),
    )
    .unwrap();
    let mut bytes = STANDARD.decode(encode_macaroon(&bare).unwrap()).unwrap();
    let sig_at = bytes.len() - 32;
    bytes[sig_at..].copy_from_slice(&minted[minted.len() - 32..]);
    let stripped = decode_macaroon(&STANDARD.encode(&bytes)).unwrap();
    let forged = Token::from_macaroon(stripped).unwrap();
    assert!(forged.caveats().unwrap().is_empty());

    let response = harness.access(&forged, &[]).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error(), "invalid_signature");
}

#[tokio::test]
async fn test_wrong_preimage() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now());

    let response = harness
        .access(&token.with_preimage(Preimage::random()), &[])
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error(), "invalid_preimage");
}

#[tokio::test]
async fn test_malformed_credentials() {
    let harness = TestHarness::setup();

    let response = harness
        .get("/protected", &[("authorization", "LSAT not*base64:")])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), "malformed_token");

    let short_id = Macaroon::create(
        None,
        &MacaroonKey::from(&[1u8; 32]),
        ByteString::from(b"short".to_vec()),
    )
    .unwrap();
    let header = format!("LSAT {}:", encode_macaroon(&short_id).unwrap());
    let response = harness.get("/protected", &[("authorization", &header)]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error(), "malformed_identifier");

    // Other schemes are treated as no credentials at all.
    let response = harness
        .get("/protected", &[("authorization", "Bearer abc")])
        .await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert!(response.challenge().is_some());
}

#[tokio::test]
async fn test_l402_scheme() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now());

    let header = token.to_token().replacen("LSAT", "L402", 1);
    let response = harness.get("/protected", &[("authorization", &header)]).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_gateway_outage_is_503_without_details() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.gateway().set_available(false);

    for response in [
        harness.get("/protected", &[]).await,
        harness.access(&token, &[]).await,
    ] {
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json(), serde_json::json!({"error": "gateway_unavailable"}));
    }
}

#[tokio::test]
async fn test_settled_invoice_survives_outage() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    harness.pay(&token, 10, Utc::now());

    assert_eq!(harness.access(&token, &[]).await.status, StatusCode::OK);
    harness.gateway().set_available(false);
    assert_eq!(harness.access(&token, &[]).await.status, StatusCode::OK);
    assert!(harness.gate().cache().stats().hits >= 1);
}

#[tokio::test]
async fn test_origin_caveat() {
    let mut config = GateConfig::default();
    config.caveats.origin = true;
    let harness = TestHarness::setup_with_config(config);

    let client = [("x-forwarded-for", CLIENT_IP)];
    let token = harness.challenge(&client).await;
    assert_eq!(token.caveats().unwrap()[1], Caveat::new("ip", CLIENT_IP));
    harness.pay(&token, 10, Utc::now());

    assert_eq!(harness.access(&token, &client).await.status, StatusCode::OK);

    let response = harness
        .access(&token, &[("x-forwarded-for", "10.1.1.1")])
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error(), "caveat_violated");

    let response = harness.access(&token, &[("x-real-ip", CLIENT_IP)]).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_origin_from_connection() {
    let mut config = GateConfig::default();
    config.caveats.origin = true;
    let harness = TestHarness::setup_with_config(config);
    let peer = "10.0.0.5:41000".parse().unwrap();

    let response = harness.get_from("/protected", &[], Some(peer)).await;
    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    let token = Token::from_challenge(response.challenge().unwrap()).unwrap();
    assert_eq!(token.caveats().unwrap()[1], Caveat::new("ip", "10.0.0.5"));

    // Without any address the ip caveat cannot be minted.
    let response = harness.get("/protected", &[]).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error(), "caveat_provider_error");
}

#[tokio::test]
async fn test_invoice_status_route() {
    let harness = TestHarness::setup();
    let token = harness.challenge(&[]).await;
    let authorization = token.to_token();
    let headers = [("authorization", authorization.as_str())];

    let status = harness.get("/invoice", &headers).await;
    assert_eq!(status.status, StatusCode::OK);
    let body = status.json();
    assert_eq!(body["payment_hash"], token.payment_hash().to_hex());
    assert_eq!(body["settled"], false);
    assert_eq!(body["amount_requested"], 10);
    assert!(body["access_until"].is_null());

    harness.pay(&token, 10, Utc::now());
    let body = harness.get("/invoice", &headers).await.json();
    assert_eq!(body["settled"], true);
    assert_eq!(body["amount_paid"], 10);
    assert!(body["access_until"].is_string());

    let response = harness.get("/invoice", &[]).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}
