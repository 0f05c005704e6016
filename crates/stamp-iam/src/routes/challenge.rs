//! `POST /challenge`

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use stamp_common::{RequestPayload, VerifiableCredential};
use stamp_verify::challenge::issue_challenge;
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub payload: RequestPayload,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub credential: VerifiableCredential,
}

/// Issue a challenge credential for `payload.address` and `payload.type`
#[instrument(skip(state, request), fields(address = %request.payload.address, credential_type = %request.payload.credential_type))]
pub async fn challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> ApiResult<Json<ChallengeResponse>> {
    let payload = request.payload;
    let challenge = issue_challenge(&payload.address, &payload.credential_type)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let credential = state.issuer.issue_challenge_credential(&challenge)?;

    info!("Issued challenge");
    Ok(Json(ChallengeResponse { credential }))
}
