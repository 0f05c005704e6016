//! `POST /verify`
//!
//! Checks the challenge credential, recovers the signer of the challenge,
//! then verifies every requested type and issues credentials for the valid
//! ones.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use stamp_common::{CredentialResponse, RequestPayload, VerifiableCredential};
use stamp_verify::challenge::ChallengeAnswer;
use stamp_verify::SignedChallenge;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Challenge credential previously issued by `/challenge`
    pub challenge: VerifiableCredential,
    pub payload: RequestPayload,
    /// DID session answer; wallet answers travel in `payload.proofs.signature`
    #[serde(default)]
    pub signed_challenge: Option<SignedChallenge>,
}

#[instrument(skip(state, request), fields(address = %request.payload.address))]
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<Response> {
    let payload = request.payload;

    let challenge_text = state.issuer.verify_challenge_credential(
        &request.challenge,
        &payload.address,
        &payload.credential_type,
    )?;

    let answer = match (&request.signed_challenge, payload.proofs.get("signature")) {
        (Some(signed), _) => ChallengeAnswer::DidSession(signed),
        (None, Some(signature)) => ChallengeAnswer::Wallet(signature),
        (None, None) => return Err(ApiError::unauthorized("Missing challenge signature")),
    };
    let signer = state.challenges.verify(answer, &challenge_text)?;

    if !signer.eq_ignore_ascii_case(&payload.address) {
        warn!(%signer, "Challenge signed by a different address");
        return Err(ApiError::unauthorized("Unable to verify payload signer"));
    }

    let types = payload.requested_types();
    if types.is_empty() {
        return Err(ApiError::bad_request("No credential types requested"));
    }

    let results = state.orchestrator.verify_many(&types, &payload).await;
    let responses = state.issuer.issue_for_results(&signer, results);
    let responses = state.filter.filter_bans(responses).await;

    let issued = responses.iter().filter(|r| !r.is_error()).count();
    info!(issued, requested = types.len(), "Verification complete");

    if payload.is_multi() {
        return Ok(Json(responses).into_response());
    }
    single_response(responses)
}

/// Legacy single-type callers get the response itself, or its error as the HTTP status
fn single_response(responses: Vec<CredentialResponse>) -> ApiResult<Response> {
    let response = responses
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("Unable to verify payload"))?;

    match (&response.error, response.code) {
        (Some(error), code) => {
            let status = code
                .and_then(|c| StatusCode::from_u16(c).ok())
                .unwrap_or(StatusCode::BAD_REQUEST);
            Err(ApiError::new(status, error.clone()))
        }
        (None, _) => Ok(Json(response).into_response()),
    }
}
