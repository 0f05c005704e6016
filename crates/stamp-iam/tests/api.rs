//! Integration tests for the IAM HTTP surface
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! scorer, price oracle and cache are replaced by in-memory stand-ins.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use stamp_attest::{AttestConfig, AttestationSigner, ChainTable, PriceFeed, PriceOracle};
use stamp_common::crypto::eth;
use stamp_common::{InMemoryCache, Result};
use stamp_iam::rate_limit::{RateLimitSource, RateLimiter};
use stamp_iam::scorer::ScoreService;
use stamp_iam::{providers, router, AppState};
use stamp_verify::challenge::ChallengeVerifier;
use stamp_verify::filter::{BanCheckRequest, BanStatus, RevocationStatus};
use stamp_verify::{
    BanRevocationFilter, BanService, CredentialIssuer, PlatformIndex, ProviderRegistry,
    RevocationService, VerificationOrchestrator,
};
use std::sync::Arc;
use tower::ServiceExt;

const WALLET_KEY: [u8; 32] = {
    let mut key = [0u8; 32];
    key[31] = 1;
    key
};
const WALLET: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
const API_KEY: &str = "test-key";

const CHAINS: &str = r#"{
    "0xa": {
        "verifierAddress": "0x2222222222222222222222222222222222222222",
        "issuerAddress": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
        "easSchemas": {
            "stamp": { "uid": "0x1111111111111111111111111111111111111111111111111111111111111111" },
            "score": { "uid": "0x3333333333333333333333333333333333333333333333333333333333333333" }
        }
    }
}"#;

struct NoBans;

#[async_trait]
impl BanService for NoBans {
    async fn check_bans(&self, requests: Vec<BanCheckRequest>) -> Result<Vec<BanStatus>> {
        Ok(requests
            .into_iter()
            .map(|r| BanStatus {
                id: r.id,
                is_banned: false,
                ban_type: None,
                reason: None,
                end_time: None,
            })
            .collect())
    }
}

struct NoRevocations;

#[async_trait]
impl RevocationService for NoRevocations {
    async fn check_revocations(&self, proof_values: Vec<String>) -> Result<Vec<RevocationStatus>> {
        Ok(proof_values
            .into_iter()
            .map(|proof_value| RevocationStatus {
                proof_value,
                is_revoked: false,
            })
            .collect())
    }
}

struct FixedPrice;

#[async_trait]
impl PriceOracle for FixedPrice {
    async fn eth_usd_price(&self) -> Result<Decimal> {
        Ok(dec!(2000))
    }
}

struct FixedScore;

#[async_trait]
impl ScoreService for FixedScore {
    async fn score(&self, _scorer_id: u32, _address: &str) -> Result<f64> {
        Ok(23.45)
    }
}

struct FixedPolicy(&'static str);

#[async_trait]
impl RateLimitSource for FixedPolicy {
    async fn rate_limit_spec(&self, _api_key: &str) -> Result<Option<String>> {
        Ok(Some(self.0.to_string()))
    }
}

fn app(rate_limit: &'static str) -> Router {
    let cache = Arc::new(InMemoryCache::default());
    let issuer = CredentialIssuer::new(ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]));

    let orchestrator = VerificationOrchestrator::new(
        Arc::new(ProviderRegistry::new(providers::default_providers())),
        Arc::new(PlatformIndex::new(&providers::default_platforms())),
    );

    let signer = AttestationSigner::from_hex_keys(
        &hex::encode(WALLET_KEY),
        &"02".repeat(32),
        Arc::new(ChainTable::from_json(CHAINS).unwrap()),
        Arc::new(PriceFeed::new(cache.clone(), Arc::new(FixedPrice))),
        AttestConfig::default(),
    )
    .unwrap();

    router(AppState {
        issuer: Arc::new(issuer),
        challenges: Arc::new(ChallengeVerifier::default()),
        orchestrator: Arc::new(orchestrator),
        filter: Arc::new(BanRevocationFilter::new(Arc::new(NoBans), Arc::new(NoRevocations))),
        signer: Arc::new(signer),
        scores: Arc::new(FixedScore),
        rate_limiter: Arc::new(RateLimiter::new(Arc::new(FixedPolicy(rate_limit)), cache)),
        default_scorer_id: 335,
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>, api_key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn challenge(app: &Router, credential_type: &str) -> Value {
    let (status, body) = call(
        app,
        "POST",
        "/api/v0.0.0/challenge",
        Some(json!({ "payload": { "address": WALLET, "type": credential_type } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["credential"].clone()
}

fn sign(challenge: &Value, key: &[u8; 32]) -> String {
    let text = challenge["credentialSubject"]["challenge"].as_str().unwrap();
    let wallet = k256::ecdsa::SigningKey::from_slice(key).unwrap();
    eth::sign_personal_message(&wallet, text.as_bytes()).unwrap()
}

async fn issued_stamp(app: &Router) -> Value {
    let challenge = challenge(app, "Simple").await;
    let signature = sign(&challenge, &WALLET_KEY);
    let (status, body) = call(
        app,
        "POST",
        "/api/v0.0.0/verify",
        Some(json!({
            "challenge": challenge,
            "payload": {
                "type": "Simple",
                "address": WALLET,
                "version": "0.0.0",
                "proofs": { "valid": "true", "username": "alice", "signature": signature }
            }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn test_health() {
    let (status, body) = call(&app(""), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Ok" }));
}

#[tokio::test]
async fn test_challenge_rejects_bad_address() {
    let (status, body) = call(
        &app(""),
        "POST",
        "/api/v0.0.0/challenge",
        Some(json!({ "payload": { "address": "0x123", "type": "Simple" } })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_single_type_verification_issues_stamp() {
    let body = issued_stamp(&app("")).await;

    let credential = &body["credential"];
    assert_eq!(credential["credentialSubject"]["provider"], "Simple");
    assert_eq!(
        credential["credentialSubject"]["id"],
        format!("did:pkh:eip155:1:{}", WALLET)
    );
    assert_eq!(body["record"]["username"], "alice");
    assert!(body["merkle"]["root"].is_string());
    assert!(body["merkle"]["proofs"]["username"].is_object());
}

#[tokio::test]
async fn test_signature_from_other_wallet_rejected() {
    let app = app("");
    let challenge = challenge(&app, "Simple").await;
    let signature = sign(&challenge, &[2u8; 32]);

    let (status, _) = call(
        &app,
        "POST",
        "/api/v0.0.0/verify",
        Some(json!({
            "challenge": challenge,
            "payload": {
                "type": "Simple",
                "address": WALLET,
                "proofs": { "valid": "true", "signature": signature }
            }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_challenge_for_other_type_rejected() {
    let app = app("");
    let challenge = challenge(&app, "Other").await;
    let signature = sign(&challenge, &WALLET_KEY);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v0.0.0/verify",
        Some(json!({
            "challenge": challenge,
            "payload": {
                "type": "Simple",
                "address": WALLET,
                "proofs": { "valid": "true", "signature": signature }
            }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid challenge"));
}

#[tokio::test]
async fn test_multi_type_verification_reports_each_type() {
    let app = app("");
    let challenge = challenge(&app, "Simple").await;
    let signature = sign(&challenge, &WALLET_KEY);

    let (status, body) = call(
        &app,
        "POST",
        "/api/v0.0.0/verify",
        Some(json!({
            "challenge": challenge,
            "payload": {
                "type": "Simple",
                "types": ["Simple", "Missing"],
                "address": WALLET,
                "proofs": { "valid": "true", "signature": signature }
            }
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert!(responses.iter().any(|r| r["credential"].is_object()));
    assert!(responses
        .iter()
        .any(|r| r["code"] == 403 && r["error"] == "Missing provider"));
}

#[tokio::test]
async fn test_eas_requires_api_key() {
    let (status, _) = call(
        &app(""),
        "POST",
        "/api/v0.0.0/eas/score",
        Some(json!({ "recipient": WALLET, "nonce": 1, "chainIdHex": "0xa" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_eas_rejects_path_like_api_key() {
    let (status, _) = call(
        &app("1/1m"),
        "POST",
        "/api/v0.0.0/eas/score",
        Some(json!({ "recipient": WALLET, "nonce": 1, "chainIdHex": "0xa" })),
        Some("x/../../../internal/score/v2/1/0xabc?"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_score_attestation_is_rate_limited() {
    let app = app("1/1m");
    let request = json!({ "recipient": WALLET, "nonce": "5", "chainIdHex": "0xa" });

    let (status, body) = call(&app, "POST", "/api/v0.0.0/eas/score", Some(request.clone()), Some(API_KEY)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let requests = body["passport"]["multiAttestationRequest"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["schema"], format!("0x{}", "33".repeat(32)));
    assert_eq!(body["passport"]["nonce"], "5");
    assert_eq!(body["passport"]["fee"], "1000000000000000");
    assert!(body["signature"]["r"].as_str().unwrap().starts_with("0x"));

    let (status, body) = call(&app, "POST", "/api/v0.0.0/eas/score", Some(request), Some(API_KEY)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit error: Rate limit exceeded");
}

#[tokio::test]
async fn test_stamp_attestation_separates_invalid_credentials() {
    let app = app("");
    let stamp = issued_stamp(&app).await["credential"].clone();

    let mut tampered = stamp.clone();
    tampered["credentialSubject"]["provider"] = json!("Forged");

    let (status, body) = call(
        &app,
        "POST",
        "/api/v0.0.0/eas",
        Some(json!({ "credentials": [stamp, tampered], "nonce": 1, "chainIdHex": "0xa" })),
        Some(API_KEY),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let requests = body["passport"]["multiAttestationRequest"].as_array().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["data"].as_array().unwrap().len(), 1);
    assert_eq!(requests[0]["data"][0]["recipient"], WALLET);
    assert_eq!(body["invalidCredentials"].as_array().unwrap().len(), 1);
    assert_eq!(body["invalidCredentials"][0]["credentialSubject"]["provider"], "Forged");
}

#[tokio::test]
async fn test_unknown_chain_is_client_error() {
    let (status, body) = call(
        &app(""),
        "POST",
        "/api/v0.0.0/eas/score",
        Some(json!({ "recipient": WALLET, "nonce": 1, "chainIdHex": "0x99" })),
        Some(API_KEY),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No onchainInfo found for chainId 0x99");
}
