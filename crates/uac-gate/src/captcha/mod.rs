//! Slide-captcha challenges and drag-trajectory verification.
//!
//! - `generator` issues challenge records (id, target, expiry)
//! - `store` persists them and enforces single use
//! - `verifier` scores the submitted drag

mod generator;
mod stats;
mod store;
mod verifier;

#[cfg(test)]
pub(crate) mod fixtures;

pub use generator::ChallengeGenerator;
pub use stats::{CaptchaStats, StatsSnapshot};
pub use store::{ChallengeStore, MemoryChallengeStore, RedisChallengeStore, store_janitor};
pub use verifier::{HeuristicConfig, TrajectoryVerifier};
