//! Challenge issuing.
//!
//! Background and puzzle images are not rendered; clients get placeholder
//! URLs keyed by the challenge id.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use uac_common::ChallengeRecord;

use crate::config::TargetArea;

/// Challenge generator service
pub struct ChallengeGenerator {
    /// Challenge TTL in seconds
    pub challenge_ttl: u64,
    /// Where the puzzle piece may be placed
    pub target_area: TargetArea,
}

impl ChallengeGenerator {
    pub fn new(challenge_ttl: u64, target_area: TargetArea) -> Self {
        Self {
            challenge_ttl,
            target_area,
        }
    }

    /// Build a fresh ACTIVE challenge with a random target
    pub fn generate(&self) -> ChallengeRecord {
        let mut rng = rand::rng();
        let area = &self.target_area;

        let target_x = rng.random_range(area.x_min..=area.x_max).round();
        let target_y = rng.random_range(area.y_min..=area.y_max).round();

        ChallengeRecord::new(
            self.generate_challenge_id(),
            target_x,
            target_y,
            self.challenge_ttl,
        )
    }

    /// Generate a cryptographically random challenge ID
    fn generate_challenge_id(&self) -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn background_url(challenge_id: &str) -> String {
        format!("/captcha/{}/background.png", challenge_id)
    }

    pub fn puzzle_url(challenge_id: &str) -> String {
        format!("/captcha/{}/puzzle.png", challenge_id)
    }
}
