//! Shared constants for UAC components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default gate HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Captcha challenge validity (5 minutes)
pub const CAPTCHA_TTL_SECS: u64 = 300;

/// How long finished challenges are kept around after expiry (10 minutes)
pub const CAPTCHA_RETENTION_SECS: u64 = 600;

/// Minimum trajectory samples for a meaningful verification
pub const MIN_TRAJECTORY_POINTS: usize = 10;

/// Maximum accepted request body (bounds trajectory size)
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Interval between in-memory store sweeps (seconds)
pub const JANITOR_INTERVAL_SECS: u64 = 30;

/// Redis key prefixes
pub mod redis_keys {
    /// Captcha challenge hash: captcha:{challenge_id}
    pub const CAPTCHA_PREFIX: &str = "captcha:";
}

/// Envelope messages returned at the verification boundary
pub mod messages {
    pub const OK: &str = "ok";
    pub const CAPTCHA_INVALID: &str = "captcha invalid or expired";
    pub const VERIFICATION_FAILED: &str = "verification failed";
    pub const INVALID_REQUEST: &str = "invalid request";
    pub const INTERNAL_ERROR: &str = "internal error";
    pub const STORE_UNAVAILABLE: &str = "challenge store unavailable";
}
