//! Core types shared across UAC components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One recorded pointer position during a drag gesture.
///
/// Timestamps are client-side milliseconds and are expected to be
/// non-decreasing within a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub x: f64,
    pub y: f64,
    pub timestamp: i64,
}

impl TrajectorySample {
    pub fn new(x: f64, y: f64, timestamp: i64) -> Self {
        Self { x, y, timestamp }
    }

    /// Euclidean distance to another sample
    pub fn distance(&self, other: &TrajectorySample) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Coordinates rounded to the nearest integer pixel, halves toward +inf
    pub fn rounded_key(&self) -> (i64, i64) {
        ((self.x + 0.5).floor() as i64, (self.y + 0.5).floor() as i64)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One heuristic score in [0, 1] with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: f64,
    pub reason: String,
}

impl SubScore {
    pub fn new(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: reason.into(),
        }
    }
}

/// Score breakdown of a verification that got past the preconditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetails {
    pub trajectory: SubScore,
    pub velocity: SubScore,
    pub repetition: SubScore,
    pub total_score: f64,
}

/// Outcome of a trajectory verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub reason: String,
    /// Absent when the trajectory was rejected before scoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ScoreDetails>,
}

impl VerificationResult {
    /// Early rejection without a score breakdown
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
            details: None,
        }
    }

    pub fn total_score(&self) -> Option<f64> {
        self.details.as_ref().map(|d| d.total_score)
    }
}

/// Lifecycle state of a captcha challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Issued, waiting for a drag
    Active,
    /// Verified once; never honoured again
    Used,
    /// Past its expiry without a successful verification
    Expired,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

impl Default for ChallengeStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChallengeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown challenge status: {other}")),
        }
    }
}

/// A server-issued slide-captcha challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    /// Opaque unique identifier
    pub challenge_id: String,

    /// Intended drop position (server-side only)
    pub target_x: f64,
    pub target_y: f64,

    /// Creation timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// Expiry timestamp (Unix epoch seconds)
    pub expires_at: i64,

    pub status: ChallengeStatus,

    /// Set when the challenge transitions to `Used`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
}

impl ChallengeRecord {
    pub fn new(challenge_id: String, target_x: f64, target_y: f64, ttl_secs: u64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            challenge_id,
            target_x,
            target_y,
            created_at: now,
            expires_at: now + ttl_secs as i64,
            status: ChallengeStatus::Active,
            verified_at: None,
        }
    }

    /// Active and not yet past its expiry at `now`
    pub fn is_active_at(&self, now: i64) -> bool {
        self.status == ChallengeStatus::Active && self.expires_at > now
    }
}

/// Standard `{code, message, data}` response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: crate::constants::messages::OK.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: u16, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}
