//! Recorded drag samples shared by captcha and route tests.

use uac_common::TrajectorySample;

/// Smooth rightward drag with jitter and uneven pacing
pub fn human_trail() -> Vec<TrajectorySample> {
    let ys = [0.0, 1.0, 3.0, 2.0, 4.0, 3.0, 5.0, 4.0, 6.0, 5.0, 7.0, 6.0, 8.0, 7.0, 9.0];
    let dts = [20, 12, 25, 15, 22, 11, 24, 14, 21, 13, 26, 16, 23, 12];

    let mut t = 1_000;
    let mut trail = vec![TrajectorySample::new(100.0, 50.0 + ys[0], t)];
    for i in 1..ys.len() {
        t += dts[i - 1];
        trail.push(TrajectorySample::new(100.0 + 10.0 * i as f64, 50.0 + ys[i], t));
    }
    trail
}

/// Pointer held still while the clock runs
pub fn stationary_trail(n: usize) -> Vec<TrajectorySample> {
    (0..n)
        .map(|i| TrajectorySample::new(100.0, 50.0, i as i64 * 10))
        .collect()
}
