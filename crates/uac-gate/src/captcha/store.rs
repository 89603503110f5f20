//! Challenge persistence.
//!
//! Two backends share one contract:
//! - Redis: one hash per challenge, expiry handled by key TTL
//! - Memory: a locked map swept by a background janitor
//!
//! `mark_used` is a single atomic check-and-set in both, so a challenge is
//! honoured at most once even when the same trajectory is replayed.

use anyhow::{Context, Result, anyhow};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uac_common::constants::redis_keys::CAPTCHA_PREFIX;
use uac_common::{ChallengeRecord, ChallengeStatus};

use super::{CaptchaStats, ChallengeGenerator};

/// ACTIVE -> USED, only while unexpired. Returns 1 on transition.
const MARK_USED_LUA: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= ARGV[1] then
    return 0
end
if tonumber(redis.call('HGET', KEYS[1], 'expires_at')) <= tonumber(ARGV[3]) then
    return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[2], 'verified_at', ARGV[3])
return 1
"#;

/// Challenge store backend
pub enum ChallengeStore {
    Redis(RedisChallengeStore),
    Memory(MemoryChallengeStore),
}

impl ChallengeStore {
    /// Issue and persist a new ACTIVE challenge
    pub async fn create_challenge(&self, generator: &ChallengeGenerator) -> Result<ChallengeRecord> {
        let record = generator.generate();
        self.insert(&record).await?;

        tracing::debug!(
            challenge_id = %record.challenge_id,
            expires_at = record.expires_at,
            backend = self.backend_name(),
            "Challenge stored"
        );

        Ok(record)
    }

    pub async fn insert(&self, record: &ChallengeRecord) -> Result<()> {
        match self {
            Self::Redis(store) => store.insert(record).await,
            Self::Memory(store) => store.insert(record).await,
        }
    }

    /// Look up a challenge that is ACTIVE and not past its expiry
    pub async fn find_active(&self, challenge_id: &str) -> Result<Option<ChallengeRecord>> {
        let now = chrono::Utc::now().timestamp();
        match self {
            Self::Redis(store) => store.find_active(challenge_id, now).await,
            Self::Memory(store) => store.find_active(challenge_id, now).await,
        }
    }

    /// Atomically consume an ACTIVE challenge.
    ///
    /// Returns `false` when the challenge is missing, already used, or
    /// expired at `verified_at`.
    pub async fn mark_used(&self, challenge_id: &str, verified_at: i64) -> Result<bool> {
        match self {
            Self::Redis(store) => store.mark_used(challenge_id, verified_at).await,
            Self::Memory(store) => store.mark_used(challenge_id, verified_at).await,
        }
    }

    /// Backend connectivity check
    pub async fn ping(&self) -> Result<()> {
        match self {
            Self::Redis(store) => store.ping().await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// Mark elapsed challenges EXPIRED and drop old ones.
    ///
    /// Redis expires keys itself, so this only does work for the memory
    /// backend.
    pub async fn purge_expired(&self, now: i64) -> Result<u64> {
        match self {
            Self::Redis(_) => Ok(0),
            Self::Memory(store) => Ok(store.purge_expired(now).await),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }
}

/// Redis-backed store: `captcha:{id}` hash with TTL
pub struct RedisChallengeStore {
    /// Redis connection manager (auto-reconnecting)
    redis: ConnectionManager,
    /// Seconds a record outlives its expiry before Redis drops it
    retention_secs: u64,
    mark_used_script: redis::Script,
}

impl RedisChallengeStore {
    pub async fn connect(redis_url: &str, retention_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            redis,
            retention_secs,
            mark_used_script: redis::Script::new(MARK_USED_LUA),
        })
    }

    fn key(challenge_id: &str) -> String {
        format!("{}{}", CAPTCHA_PREFIX, challenge_id)
    }

    async fn insert(&self, record: &ChallengeRecord) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = Self::key(&record.challenge_id);
        let ttl = (record.expires_at - record.created_at).max(0) as u64 + self.retention_secs;

        let fields = [
            ("target_x", record.target_x.to_string()),
            ("target_y", record.target_y.to_string()),
            ("created_at", record.created_at.to_string()),
            ("expires_at", record.expires_at.to_string()),
            ("status", record.status.as_str().to_string()),
        ];

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, ttl as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("Failed to store challenge")?;

        Ok(())
    }

    async fn find_active(&self, challenge_id: &str, now: i64) -> Result<Option<ChallengeRecord>> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(Self::key(challenge_id))
            .await
            .context("Failed to load challenge")?;

        if fields.is_empty() {
            return Ok(None);
        }

        let record = record_from_fields(challenge_id, &fields)?;
        Ok(record.is_active_at(now).then_some(record))
    }

    async fn mark_used(&self, challenge_id: &str, verified_at: i64) -> Result<bool> {
        let mut conn = self.redis.clone();
        let updated: i32 = self
            .mark_used_script
            .key(Self::key(challenge_id))
            .arg(ChallengeStatus::Active.as_str())
            .arg(ChallengeStatus::Used.as_str())
            .arg(verified_at)
            .invoke_async(&mut conn)
            .await
            .context("Failed to mark challenge used")?;

        Ok(updated == 1)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

fn parse_field<T>(fields: &HashMap<String, String>, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = fields
        .get(name)
        .with_context(|| format!("challenge hash missing field `{name}`"))?;
    raw.parse::<T>()
        .map_err(|e| anyhow!("challenge hash field `{name}` is invalid: {e}"))
}

fn record_from_fields(challenge_id: &str, fields: &HashMap<String, String>) -> Result<ChallengeRecord> {
    let verified_at = match fields.get("verified_at") {
        Some(raw) => Some(raw.parse::<i64>().context("challenge hash field `verified_at` is invalid")?),
        None => None,
    };

    Ok(ChallengeRecord {
        challenge_id: challenge_id.to_string(),
        target_x: parse_field(fields, "target_x")?,
        target_y: parse_field(fields, "target_y")?,
        created_at: parse_field(fields, "created_at")?,
        expires_at: parse_field(fields, "expires_at")?,
        status: parse_field(fields, "status")?,
        verified_at,
    })
}

/// In-process store for single-node deployments and tests
#[derive(Clone, Default)]
pub struct MemoryChallengeStore {
    records: Arc<RwLock<HashMap<String, ChallengeRecord>>>,
    /// Seconds a record outlives its expiry before the janitor drops it
    retention_secs: u64,
}

impl MemoryChallengeStore {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            retention_secs,
        }
    }

    async fn insert(&self, record: &ChallengeRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.challenge_id.clone(), record.clone());
        Ok(())
    }

    async fn find_active(&self, challenge_id: &str, now: i64) -> Result<Option<ChallengeRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(challenge_id)
            .filter(|r| r.is_active_at(now))
            .cloned())
    }

    async fn mark_used(&self, challenge_id: &str, verified_at: i64) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(challenge_id) {
            Some(record) if record.is_active_at(verified_at) => {
                record.status = ChallengeStatus::Used;
                record.verified_at = Some(verified_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: i64) -> u64 {
        let mut records = self.records.write().await;

        let mut expired = 0;
        for record in records.values_mut() {
            if record.status == ChallengeStatus::Active && record.expires_at <= now {
                record.status = ChallengeStatus::Expired;
                expired += 1;
            }
        }

        let retention = self.retention_secs as i64;
        records.retain(|_, r| r.expires_at + retention > now);

        expired
    }

    #[cfg(test)]
    pub async fn get(&self, challenge_id: &str) -> Option<ChallengeRecord> {
        self.records.read().await.get(challenge_id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Background sweeper for the memory backend
pub async fn store_janitor(
    store: Arc<ChallengeStore>,
    stats: Arc<CaptchaStats>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(
        backend = store.backend_name(),
        interval_secs = interval.as_secs(),
        "Store janitor started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let now = chrono::Utc::now().timestamp();
                match store.purge_expired(now).await {
                    Ok(0) => {}
                    Ok(count) => {
                        stats.record_expired(count);
                        tracing::debug!(expired = count, "Expired challenges swept");
                    }
                    Err(e) => tracing::error!(error = %e, "Store janitor sweep failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Store janitor shutting down");
                break;
            }
        }
    }
}
