//! Captcha counters exposed on `/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CaptchaStats {
    issued: AtomicU64,
    passed: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    expired: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Challenges issued
    pub issued: u64,
    /// Trajectories accepted (challenge consumed)
    pub passed: u64,
    /// Trajectories scored as automated or malformed
    pub rejected: u64,
    /// Verifications against missing, used, or expired challenges
    pub unavailable: u64,
    /// Challenges swept by the janitor
    pub expired: u64,
}

impl CaptchaStats {
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_passed(&self) {
        self.passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            issued: self.issued.load(Ordering::Relaxed),
            passed: self.passed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
