//! Drag-trajectory verification.
//!
//! Scores a recorded slider drag on three independent heuristics and
//! combines them into a weighted total:
//! - Shape: average turning angle and vertical jitter
//! - Velocity: presence of natural acceleration/deceleration
//! - Repetition: share of duplicated (rounded) coordinates
//!
//! Every sub-score starts at 1.0 and is multiplied by `flag_penalty` for
//! each anomaly it detects. The verifier is pure: no I/O, no clock, no
//! randomness, so it can be shared across request tasks without locking.

use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use uac_common::constants::MIN_TRAJECTORY_POINTS;
use uac_common::{ScoreDetails, SubScore, TrajectorySample, UacError, VerificationResult};

pub const REASON_INSUFFICIENT_POINTS: &str = "insufficient trajectory points";
pub const REASON_ABNORMAL_TIMESTAMPS: &str = "abnormal trajectory timestamps";
pub const REASON_IDENTICAL_TIMESTAMPS: &str =
    "all points share identical timestamps, cannot analyze velocity";
pub const REASON_MISSING_PHASE: &str = "missing clear acceleration or deceleration phase";
pub const REASON_NORMAL: &str = "normal";
pub const REASON_HUMAN: &str = "trajectory looks human";
pub const REASON_AUTOMATED: &str = "trajectory looks automated";

/// Tuning knobs for the trajectory heuristics
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Fewer samples than this are rejected outright
    pub min_points: usize,
    /// Average turning angle (degrees) above which the path looks erratic
    pub max_avg_curvature_deg: f64,
    /// Band for the average absolute vertical step (pixels)
    pub min_avg_y_change: f64,
    pub max_avg_y_change: f64,
    /// Average absolute velocity change below which motion looks scripted
    pub min_avg_velocity_change: f64,
    /// `v[i] > v[i-1] * acceleration_ratio` counts as acceleration
    pub acceleration_ratio: f64,
    /// `v[i] < v[i-1] * deceleration_ratio` counts as deceleration
    pub deceleration_ratio: f64,
    /// Share of duplicated rounded coordinates tolerated
    pub max_repetition_rate: f64,
    /// Multiplier applied to a sub-score per anomaly
    pub flag_penalty: f64,
    pub trajectory_weight: f64,
    pub velocity_weight: f64,
    pub repetition_weight: f64,
    /// Totals strictly above this pass
    pub pass_threshold: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            min_points: MIN_TRAJECTORY_POINTS,
            max_avg_curvature_deg: 45.0,
            min_avg_y_change: 0.1,
            max_avg_y_change: 5.0,
            min_avg_velocity_change: 0.05,
            acceleration_ratio: 1.1,
            deceleration_ratio: 0.9,
            max_repetition_rate: 0.1,
            flag_penalty: 0.5,
            trajectory_weight: 0.3,
            velocity_weight: 0.5,
            repetition_weight: 0.2,
            pass_threshold: 0.5,
        }
    }
}

/// Failures that are not a verdict on the trajectory itself
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptchaError {
    #[error("sample {index} has a non-finite coordinate")]
    NonFiniteSample { index: usize },

    #[error("score computation produced a non-finite total")]
    NonFiniteScore,
}

impl From<CaptchaError> for UacError {
    fn from(err: CaptchaError) -> Self {
        UacError::Captcha(err.to_string())
    }
}

/// Accumulates anomaly flags for one sub-score
struct Flags {
    score: f64,
    penalty: f64,
    reasons: Vec<String>,
}

impl Flags {
    fn new(penalty: f64) -> Self {
        Self {
            score: 1.0,
            penalty,
            reasons: Vec::new(),
        }
    }

    fn flag(&mut self, reason: impl Into<String>) {
        self.score *= self.penalty;
        self.reasons.push(reason.into());
    }

    fn finish(self) -> SubScore {
        let reason = if self.reasons.is_empty() {
            REASON_NORMAL.to_string()
        } else {
            self.reasons.join(", ")
        };
        SubScore::new(self.score, reason)
    }
}

/// Stateless trajectory verifier
#[derive(Debug, Clone, Default)]
pub struct TrajectoryVerifier {
    config: HeuristicConfig,
}

impl TrajectoryVerifier {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    /// Verify a submitted drag trajectory.
    ///
    /// Malformed trajectories (missing, too short, degenerate timestamps)
    /// yield `Ok` with `is_valid = false`. `Err` is reserved for input the
    /// arithmetic cannot handle, which callers should report as an
    /// internal failure.
    ///
    /// `duration_ms` is the client-claimed drag duration; it is logged but
    /// does not take part in scoring.
    pub fn verify(
        &self,
        trail: Option<&[TrajectorySample]>,
        duration_ms: f64,
    ) -> Result<VerificationResult, CaptchaError> {
        let trail = match trail {
            Some(trail) if trail.len() >= self.config.min_points => trail,
            _ => return Ok(VerificationResult::rejected(REASON_INSUFFICIENT_POINTS)),
        };

        // One increasing pair is enough; this is not a full monotonicity check.
        if !trail.windows(2).any(|w| w[1].timestamp > w[0].timestamp) {
            return Ok(VerificationResult::rejected(REASON_ABNORMAL_TIMESTAMPS));
        }

        if let Some(index) = trail.iter().position(|s| !s.is_finite()) {
            return Err(CaptchaError::NonFiniteSample { index });
        }

        let trajectory = self.shape_score(trail);
        let velocity = self.velocity_score(trail);
        let repetition = self.repetition_score(trail);

        let total_score = self.config.trajectory_weight * trajectory.score
            + self.config.velocity_weight * velocity.score
            + self.config.repetition_weight * repetition.score;

        if !total_score.is_finite() {
            return Err(CaptchaError::NonFiniteScore);
        }

        let is_valid = total_score > self.config.pass_threshold;

        tracing::debug!(
            points = trail.len(),
            duration_ms,
            trajectory = trajectory.score,
            velocity = velocity.score,
            repetition = repetition.score,
            total_score,
            is_valid,
            "Trajectory scored"
        );

        Ok(VerificationResult {
            is_valid,
            reason: if is_valid { REASON_HUMAN } else { REASON_AUTOMATED }.to_string(),
            details: Some(ScoreDetails {
                trajectory,
                velocity,
                repetition,
                total_score,
            }),
        })
    }

    /// Path shape: average turning angle and average vertical step.
    ///
    /// Turns next to a zero-length step have no angle and are left out of
    /// the average instead of poisoning it with NaN, so a paused but erratic
    /// drag is still flagged.
    pub fn shape_score(&self, trail: &[TrajectorySample]) -> SubScore {
        let mut flags = Flags::new(self.config.flag_penalty);

        let mut angle_sum = 0.0;
        let mut angle_count = 0usize;
        for w in trail.windows(3) {
            let (ax, ay) = (w[1].x - w[0].x, w[1].y - w[0].y);
            let (bx, by) = (w[2].x - w[1].x, w[2].y - w[1].y);

            // No direction when the pointer did not move; the angle is undefined.
            let norms = ax.hypot(ay) * bx.hypot(by);
            if norms == 0.0 {
                continue;
            }

            let cos = ((ax * bx + ay * by) / norms).clamp(-1.0, 1.0);
            angle_sum += cos.acos().to_degrees();
            angle_count += 1;
        }
        let avg_curvature = if angle_count == 0 {
            0.0
        } else {
            angle_sum / angle_count as f64
        };

        // The lower bound can never trip for an average of angles.
        if avg_curvature < 0.0 || avg_curvature > self.config.max_avg_curvature_deg {
            flags.flag(format!("average curvature out of range: {avg_curvature:.2}"));
        }

        let avg_y_change = if trail.len() < 2 {
            0.0
        } else {
            trail
                .windows(2)
                .map(|w| (w[1].y - w[0].y).abs())
                .sum::<f64>()
                / (trail.len() - 1) as f64
        };

        if avg_y_change < self.config.min_avg_y_change
            || avg_y_change > self.config.max_avg_y_change
        {
            flags.flag(format!("average vertical change out of range: {avg_y_change:.2}"));
        }

        flags.finish()
    }

    /// Velocity profile: variation and acceleration/deceleration phases
    pub fn velocity_score(&self, trail: &[TrajectorySample]) -> SubScore {
        let Some(first) = trail.first() else {
            return SubScore::new(0.0, REASON_IDENTICAL_TIMESTAMPS);
        };
        if trail.iter().all(|s| s.timestamp == first.timestamp) {
            return SubScore::new(0.0, REASON_IDENTICAL_TIMESTAMPS);
        }

        let mut flags = Flags::new(self.config.flag_penalty);

        // Steps whose clock did not advance carry no speed information.
        let velocities: Vec<f64> = trail
            .windows(2)
            .filter_map(|w| {
                // Client clocks are untrusted; a gap that overflows is unusable.
                let dt = w[1].timestamp.checked_sub(w[0].timestamp)?;
                (dt > 0).then(|| w[1].distance(&w[0]) / dt as f64)
            })
            .collect();

        let avg_velocity_change = if velocities.len() < 2 {
            0.0
        } else {
            velocities
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .sum::<f64>()
                / (velocities.len() - 1) as f64
        };

        if avg_velocity_change < self.config.min_avg_velocity_change {
            flags.flag(format!("velocity change too uniform: {avg_velocity_change:.2}"));
        }

        let has_acceleration = velocities
            .windows(2)
            .any(|w| w[1] > w[0] * self.config.acceleration_ratio);
        let has_deceleration = velocities
            .windows(2)
            .any(|w| w[1] < w[0] * self.config.deceleration_ratio);

        if !(has_acceleration && has_deceleration) {
            flags.flag(REASON_MISSING_PHASE);
        }

        flags.finish()
    }

    /// Share of samples whose rounded coordinates duplicate another sample
    pub fn repetition_score(&self, trail: &[TrajectorySample]) -> SubScore {
        let mut flags = Flags::new(self.config.flag_penalty);
        if trail.is_empty() {
            return flags.finish();
        }

        let distinct: HashSet<(i64, i64)> = trail.iter().map(TrajectorySample::rounded_key).collect();
        let repetition_rate = 1.0 - distinct.len() as f64 / trail.len() as f64;

        // Negative rates are impossible; the comparison stays for parity with the tuning table.
        if repetition_rate < 0.0 || repetition_rate > self.config.max_repetition_rate {
            flags.flag(format!(
                "coordinate repetition rate too high: {:.2}%",
                repetition_rate * 100.0
            ));
        }

        flags.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::fixtures::{human_trail, stationary_trail};

    const EPS: f64 = 1e-9;

    /// Perfectly straight, constant-speed drag
    fn scripted_trail() -> Vec<TrajectorySample> {
        (0..20)
            .map(|i| TrajectorySample::new(10.0 * i as f64, 80.0, i as i64 * 10))
            .collect()
    }

    /// Horizontal drag whose step length grows (or shrinks) every sample
    fn ramp_trail(slowing: bool) -> Vec<TrajectorySample> {
        let mut steps: Vec<f64> = (1..10).map(f64::from).collect();
        if slowing {
            steps.reverse();
        }
        let mut x = 0.0;
        let mut trail = vec![TrajectorySample::new(x, 40.0, 0)];
        for (i, step) in steps.iter().enumerate() {
            x += step;
            trail.push(TrajectorySample::new(x, 40.0, (i as i64 + 1) * 10));
        }
        trail
    }

    /// Right-angle-ish zig-zag
    fn zig_zag() -> Vec<TrajectorySample> {
        (0..12)
            .map(|i| {
                let (x, y) = if i % 2 == 0 { (i as f64 * 2.0, 0.0) } else { (i as f64 * 2.0 - 2.0, 2.0) };
                TrajectorySample::new(x, y, i as i64 * 10)
            })
            .collect()
    }

    /// Zig-zag where the pointer rests on one sample
    fn paused_zig_zag() -> Vec<TrajectorySample> {
        let mut trail = zig_zag();
        let rest = TrajectorySample { timestamp: trail[4].timestamp + 5, ..trail[4] };
        trail.insert(5, rest);
        for (i, s) in trail.iter_mut().enumerate() {
            s.timestamp = i as i64 * 10;
        }
        trail
    }

    fn assert_allowed(details: &ScoreDetails) {
        let shape_set = [1.0, 0.5, 0.25];
        let velocity_set = [1.0, 0.5, 0.25, 0.0];
        assert!(shape_set.contains(&details.trajectory.score));
        assert!(velocity_set.contains(&details.velocity.score));
        assert!(shape_set.contains(&details.repetition.score));
    }

    #[test]
    fn test_human_trail_passes() {
        let verifier = TrajectoryVerifier::default();
        let result = verifier.verify(Some(human_trail().as_slice()), 300.0).unwrap();

        assert!(result.is_valid, "{result:?}");
        assert_eq!(result.reason, REASON_HUMAN);
        let details = result.details.unwrap();
        assert_allowed(&details);
        assert_eq!(details.trajectory.reason, REASON_NORMAL);
        assert_eq!(details.velocity.reason, REASON_NORMAL);
        assert_eq!(details.repetition.reason, REASON_NORMAL);
        assert!((details.total_score - 1.0).abs() < EPS);
    }

    #[test]
    fn test_stationary_trail_fails() {
        let verifier = TrajectoryVerifier::default();
        let result = verifier.verify(Some(stationary_trail(10).as_slice()), 90.0).unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.reason, REASON_AUTOMATED);
        let details = result.details.unwrap();
        assert_allowed(&details);
        assert_eq!(details.trajectory.score, 0.5);
        assert_eq!(
            details.trajectory.reason,
            "average vertical change out of range: 0.00"
        );
        assert_eq!(details.velocity.score, 0.25);
        assert_eq!(
            details.velocity.reason,
            format!("velocity change too uniform: 0.00, {REASON_MISSING_PHASE}")
        );
        assert_eq!(details.repetition.score, 0.5);
        assert_eq!(
            details.repetition.reason,
            "coordinate repetition rate too high: 90.00%"
        );
        assert!((details.total_score - 0.375).abs() < EPS);
    }

    #[test]
    fn test_scripted_trail_fails() {
        let verifier = TrajectoryVerifier::default();
        let details = verifier
            .verify(Some(scripted_trail().as_slice()), 190.0)
            .unwrap()
            .details
            .unwrap();

        assert_allowed(&details);
        assert_eq!(details.trajectory.score, 0.5);
        assert_eq!(details.velocity.score, 0.25);
        assert_eq!(details.repetition.score, 1.0);
        assert!((details.total_score - 0.475).abs() < EPS);
    }

    #[test]
    fn test_too_few_points_rejected() {
        let verifier = TrajectoryVerifier::default();
        let trail = human_trail();

        for n in 0..MIN_TRAJECTORY_POINTS {
            let result = verifier.verify(Some(&trail[..n]), 100.0).unwrap();
            assert!(!result.is_valid);
            assert_eq!(result.reason, REASON_INSUFFICIENT_POINTS);
            assert!(result.details.is_none());
        }

        let result = verifier.verify(None, 100.0).unwrap();
        assert_eq!(result.reason, REASON_INSUFFICIENT_POINTS);
    }

    #[test]
    fn test_identical_timestamps_rejected() {
        let verifier = TrajectoryVerifier::default();
        let trail: Vec<_> = human_trail()
            .into_iter()
            .map(|s| TrajectorySample { timestamp: 5_000, ..s })
            .collect();

        let result = verifier.verify(Some(trail.as_slice()), 0.0).unwrap();
        assert!(!result.is_valid);
        assert_eq!(result.reason, REASON_ABNORMAL_TIMESTAMPS);

        let velocity = verifier.velocity_score(&trail);
        assert_eq!(velocity.score, 0.0);
        assert_eq!(velocity.reason, REASON_IDENTICAL_TIMESTAMPS);

        // Even perfect shape and repetition cannot clear the bar without velocity.
        let config = verifier.config();
        let best_case = config.trajectory_weight + config.repetition_weight;
        assert!(best_case <= config.pass_threshold);
    }

    #[test]
    fn test_single_increasing_pair_is_enough() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        // Clock runs backwards everywhere except the last step.
        let n = trail.len();
        for (i, s) in trail.iter_mut().enumerate() {
            s.timestamp = 10_000 - i as i64 * 10;
        }
        trail[n - 1].timestamp = 20_000;

        let result = verifier.verify(Some(trail.as_slice()), 50.0).unwrap();
        assert_ne!(result.reason, REASON_ABNORMAL_TIMESTAMPS);
        assert!(result.details.is_some());
    }

    #[test]
    fn test_threshold_is_strict() {
        // Stationary trail totals 0.375; a bar at exactly that value must not pass.
        let trail = stationary_trail(10);
        let at_bar = TrajectoryVerifier::new(HeuristicConfig {
            pass_threshold: 0.375,
            ..Default::default()
        });
        let below_bar = TrajectoryVerifier::new(HeuristicConfig {
            pass_threshold: 0.3,
            ..Default::default()
        });

        let at = at_bar.verify(Some(trail.as_slice()), 0.0).unwrap();
        let total = at.total_score().unwrap();
        assert_eq!(at.is_valid, total > 0.375);
        assert!(below_bar.verify(Some(trail.as_slice()), 0.0).unwrap().is_valid);
    }

    #[test]
    fn test_deterministic() {
        let verifier = TrajectoryVerifier::default();
        let trail = human_trail();
        let a = verifier.verify(Some(trail.as_slice()), 300.0).unwrap();
        let b = verifier.verify(Some(trail.as_slice()), 300.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.total_score().unwrap().to_bits(),
            b.total_score().unwrap().to_bits()
        );
    }

    #[test]
    fn test_non_finite_sample_is_error() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        trail[4].y = f64::NAN;

        assert_eq!(
            verifier.verify(Some(trail.as_slice()), 300.0),
            Err(CaptchaError::NonFiniteSample { index: 4 })
        );
    }

    #[test]
    fn test_erratic_shape_flags_curvature() {
        let verifier = TrajectoryVerifier::default();
        let shape = verifier.shape_score(&zig_zag());
        assert!(shape.reason.starts_with("average curvature out of range"));
        assert!(shape.score <= 0.5);
    }

    #[test]
    fn test_velocity_skips_stalled_steps() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        // Duplicate a timestamp; that step must be ignored rather than divide by zero.
        trail[3].timestamp = trail[2].timestamp;

        let velocity = verifier.velocity_score(&trail);
        assert!(velocity.score.is_finite());
        assert_eq!(velocity.reason, REASON_NORMAL);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        trail[0].timestamp = i64::MIN;
        trail[1].timestamp = i64::MAX;

        let result = verifier.verify(Some(trail.as_slice()), 300.0).unwrap();
        let details = result.details.unwrap();
        assert!(details.velocity.score.is_finite());
        assert!(details.total_score.is_finite());
    }

    #[test]
    fn test_excess_vertical_jitter_flagged() {
        let verifier = TrajectoryVerifier::default();
        let trail: Vec<_> = (0..10)
            .map(|i| TrajectorySample::new(10.0 * i as f64, 6.0 * i as f64, i as i64 * 10))
            .collect();

        let shape = verifier.shape_score(&trail);
        assert_eq!(shape.score, 0.5);
        assert_eq!(shape.reason, "average vertical change out of range: 6.00");
    }

    #[test]
    fn test_repetition_at_limit_not_flagged() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        trail.truncate(10);
        trail[9] = TrajectorySample { timestamp: trail[9].timestamp, ..trail[8] };

        let repetition = verifier.repetition_score(&trail);
        assert_eq!(repetition.score, 1.0);
        assert_eq!(repetition.reason, REASON_NORMAL);
    }

    #[test]
    fn test_repetition_over_limit_flagged() {
        let verifier = TrajectoryVerifier::default();
        let mut trail = human_trail();
        trail.truncate(11);
        for i in [9, 10] {
            trail[i] = TrajectorySample { timestamp: trail[i].timestamp, ..trail[8] };
        }

        let repetition = verifier.repetition_score(&trail);
        assert_eq!(repetition.score, 0.5);
        assert_eq!(repetition.reason, "coordinate repetition rate too high: 18.18%");
    }

    #[test]
    fn test_acceleration_only_missing_phase() {
        let verifier = TrajectoryVerifier::default();
        let velocity = verifier.velocity_score(&ramp_trail(false));
        assert_eq!(velocity.score, 0.5);
        assert_eq!(velocity.reason, REASON_MISSING_PHASE);
    }

    #[test]
    fn test_deceleration_only_missing_phase() {
        let verifier = TrajectoryVerifier::default();
        let velocity = verifier.velocity_score(&ramp_trail(true));
        assert_eq!(velocity.score, 0.5);
        assert_eq!(velocity.reason, REASON_MISSING_PHASE);
    }

    #[test]
    fn test_paused_zig_zag_still_flags_curvature() {
        let verifier = TrajectoryVerifier::default();
        let shape = verifier.shape_score(&paused_zig_zag());
        assert_eq!(shape.score, 0.5);
        assert!(shape.reason.starts_with("average curvature out of range"));
    }

    #[test]
    fn test_sub_scores_stay_in_allowed_set() {
        let verifier = TrajectoryVerifier::default();
        let mut jittery = human_trail();
        for (i, s) in jittery.iter_mut().enumerate() {
            s.y += if i % 2 == 0 { 12.0 } else { -12.0 };
        }
        let trails = [
            human_trail(),
            stationary_trail(10),
            stationary_trail(40),
            scripted_trail(),
            zig_zag(),
            paused_zig_zag(),
            ramp_trail(false),
            ramp_trail(true),
            jittery,
        ];

        for trail in &trails {
            let details = verifier.verify(Some(trail.as_slice()), 100.0).unwrap().details.unwrap();
            assert_allowed(&details);
            assert!((0.0..=1.0).contains(&details.total_score));
        }
    }

    #[test]
    fn test_config_deserializes_partial_table() {
        let config: HeuristicConfig =
            serde_json::from_str(r#"{"pass_threshold": 0.6, "min_points": 12}"#).unwrap();
        assert_eq!(config.pass_threshold, 0.6);
        assert_eq!(config.min_points, 12);
        assert_eq!(config.max_avg_curvature_deg, 45.0);
    }
}
