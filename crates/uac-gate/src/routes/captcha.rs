//! Captcha issuing and verification endpoints.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};

use super::response::{envelope, failure, success};
use crate::captcha::ChallengeGenerator;
use crate::state::AppState;
use uac_common::constants::messages;
use uac_common::{ScoreDetails, TrajectorySample, UacError, VerificationResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub captcha_id: String,
    /// Placeholder; images are not rendered
    pub background_url: String,
    /// Placeholder; images are not rendered
    pub puzzle_url: String,
    pub expires_at: i64,
}

/// Issue a new slide-captcha challenge
pub async fn issue_challenge(State(state): State<AppState>) -> Response {
    let record = match state.store.create_challenge(&state.generator).await {
        Ok(record) => record,
        Err(e) => {
            return failure(&UacError::Internal(format!("{e:#}")), messages::INTERNAL_ERROR);
        }
    };

    state.stats.record_issued();

    tracing::debug!(
        challenge_id = %record.challenge_id,
        expires_at = record.expires_at,
        "Issued captcha challenge"
    );

    success(ChallengeResponse {
        background_url: ChallengeGenerator::background_url(&record.challenge_id),
        puzzle_url: ChallengeGenerator::puzzle_url(&record.challenge_id),
        captcha_id: record.challenge_id,
        expires_at: record.expires_at,
    })
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    captcha_id: String,
    /// Client-measured drag duration in milliseconds
    #[serde(default)]
    duration: f64,
    /// Recorded drag; may be omitted or null
    #[serde(default)]
    trail: Option<Vec<TrajectorySample>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyData {
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ScoreDetails>,
}

impl VerifyData {
    fn unavailable() -> Self {
        Self {
            verified: false,
            reason: None,
            details: None,
        }
    }

    fn from_result(result: VerificationResult) -> Self {
        Self {
            verified: result.is_valid,
            reason: Some(result.reason),
            details: result.details,
        }
    }
}

/// Verify a submitted drag against an active challenge.
///
/// - 200: trajectory accepted, challenge consumed
/// - 400 "captcha invalid or expired": no active challenge with this id
/// - 400 "verification failed": trajectory rejected, challenge left active
/// - 500 "verification failed": store or scoring error
pub async fn verify_challenge(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return failure(
                &UacError::InvalidInput(rejection.body_text()),
                messages::INVALID_REQUEST,
            );
        }
    };

    let challenge = match state.store.find_active(&payload.captcha_id).await {
        Ok(Some(challenge)) => challenge,
        Ok(None) => {
            state.stats.record_unavailable();
            tracing::debug!(challenge_id = %payload.captcha_id, "Challenge missing, used, or expired");
            return envelope(
                StatusCode::BAD_REQUEST,
                messages::CAPTCHA_INVALID,
                Some(VerifyData::unavailable()),
            );
        }
        Err(e) => {
            return failure(
                &UacError::Internal(format!("{e:#}")),
                messages::VERIFICATION_FAILED,
            );
        }
    };

    let result = match state
        .verifier
        .verify(payload.trail.as_deref(), payload.duration)
    {
        Ok(result) => result,
        Err(e) => return failure(&UacError::from(e), messages::VERIFICATION_FAILED),
    };

    if !result.is_valid {
        state.stats.record_rejected();
        tracing::debug!(
            challenge_id = %challenge.challenge_id,
            reason = %result.reason,
            total_score = ?result.total_score(),
            "Captcha trajectory rejected"
        );
        return envelope(
            StatusCode::BAD_REQUEST,
            messages::VERIFICATION_FAILED,
            Some(VerifyData::from_result(result)),
        );
    }

    let verified_at = chrono::Utc::now().timestamp();
    match state.store.mark_used(&challenge.challenge_id, verified_at).await {
        Ok(true) => {
            state.stats.record_passed();
            tracing::info!(
                challenge_id = %challenge.challenge_id,
                total_score = ?result.total_score(),
                "Captcha verified successfully"
            );
            success(VerifyData::from_result(result))
        }
        Ok(false) => {
            // Another request consumed or outlived the challenge in between.
            state.stats.record_unavailable();
            tracing::warn!(challenge_id = %challenge.challenge_id, "Challenge consumed concurrently");
            envelope(
                StatusCode::BAD_REQUEST,
                messages::CAPTCHA_INVALID,
                Some(VerifyData::unavailable()),
            )
        }
        Err(e) => failure(
            &UacError::Internal(format!("{e:#}")),
            messages::VERIFICATION_FAILED,
        ),
    }
}
