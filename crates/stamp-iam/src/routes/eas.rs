//! `POST /eas` and `POST /eas/score`
//!
//! Both return a signed `PassportAttestationRequest` the client submits to
//! the verifier contract itself.

use axum::{extract::State, Json};
use serde::{de, Deserialize, Deserializer, Serialize};
use stamp_attest::{ScoreAttestation, SignedPassportAttestation};
use stamp_common::crypto::did::address_from_pkh;
use stamp_common::VerifiableCredential;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampAttestationRequest {
    pub credentials: Vec<VerifiableCredential>,
    #[serde(deserialize_with = "deserialize_nonce")]
    pub nonce: u128,
    pub chain_id_hex: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StampAttestationResponse {
    #[serde(flatten)]
    pub signed: SignedPassportAttestation,
    pub invalid_credentials: Vec<VerifiableCredential>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAttestationRequest {
    pub recipient: String,
    #[serde(deserialize_with = "deserialize_nonce")]
    pub nonce: u128,
    pub chain_id_hex: String,
    #[serde(default)]
    pub custom_scorer_id: Option<u32>,
}

/// Sign an attestation of the stamps the caller holds
#[instrument(skip(state, request), fields(chain = %request.chain_id_hex, count = request.credentials.len()))]
pub async fn attest_stamps(
    State(state): State<AppState>,
    Json(request): Json<StampAttestationRequest>,
) -> ApiResult<Json<StampAttestationResponse>> {
    let recipient = request
        .credentials
        .first()
        .and_then(|c| address_from_pkh(&c.credential_subject.id))
        .ok_or_else(|| ApiError::bad_request("No verifiable credentials provided"))?;

    let (valid, invalid): (Vec<_>, Vec<_>) = request.credentials.into_iter().partition(|c| {
        state.issuer.verify_credential(c)
            && address_from_pkh(&c.credential_subject.id)
                .map(|a| a.eq_ignore_ascii_case(&recipient))
                .unwrap_or(false)
    });
    if !invalid.is_empty() {
        warn!(invalid = invalid.len(), "Skipping credentials that failed verification");
    }

    let attestable = state.filter.filter_revocations(valid).await?;
    if attestable.is_empty() {
        return Err(ApiError::bad_request("No verifiable credentials provided"));
    }

    let signed = state
        .signer
        .build_and_sign(&attestable, None, &recipient, &request.chain_id_hex, request.nonce)
        .await?;

    info!(stamps = attestable.len(), "Stamp attestation signed");
    Ok(Json(StampAttestationResponse {
        signed,
        invalid_credentials: invalid,
    }))
}

/// Sign an attestation of the recipient's aggregate score
#[instrument(skip(state, request), fields(chain = %request.chain_id_hex, recipient = %request.recipient))]
pub async fn attest_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreAttestationRequest>,
) -> ApiResult<Json<SignedPassportAttestation>> {
    let scorer_id = request.custom_scorer_id.unwrap_or(state.default_scorer_id);
    let score = state.scores.score(scorer_id, &request.recipient).await?;

    let signed = state
        .signer
        .build_and_sign(
            &[],
            Some(ScoreAttestation { score, scorer_id }),
            &request.recipient,
            &request.chain_id_hex,
            request.nonce,
        )
        .await?;

    info!(scorer_id, score, "Score attestation signed");
    Ok(Json(signed))
}

/// Nonces arrive as JSON numbers or decimal strings
fn deserialize_nonce<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Nonce {
        Number(u64),
        Text(String),
    }

    match Nonce::deserialize(deserializer)? {
        Nonce::Number(n) => Ok(n as u128),
        Nonce::Text(s) => s.parse().map_err(de::Error::custom),
    }
}
