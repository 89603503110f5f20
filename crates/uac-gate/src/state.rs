//! Application state and shared resources.

use anyhow::Result;
use std::sync::Arc;

use crate::captcha::{
    CaptchaStats, ChallengeGenerator, ChallengeStore, MemoryChallengeStore, RedisChallengeStore,
    TrajectoryVerifier,
};
use crate::config::{AppConfig, StoreBackend};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Challenge persistence
    pub store: Arc<ChallengeStore>,

    /// Challenge generator
    pub generator: Arc<ChallengeGenerator>,

    /// Trajectory verifier
    pub verifier: Arc<TrajectoryVerifier>,

    /// Captcha counters
    pub stats: Arc<CaptchaStats>,
}

impl AppState {
    /// Create new application state, connecting the configured store
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store = match config.store.backend {
            StoreBackend::Redis => ChallengeStore::Redis(
                RedisChallengeStore::connect(&config.redis_url, config.store.retention_secs).await?,
            ),
            StoreBackend::Memory => {
                ChallengeStore::Memory(MemoryChallengeStore::new(config.store.retention_secs))
            }
        };

        Ok(Self::with_store(config, store))
    }

    /// Build state around an already constructed store
    pub fn with_store(config: AppConfig, store: ChallengeStore) -> Self {
        let generator = Arc::new(ChallengeGenerator::new(
            config.captcha.challenge_ttl_secs,
            config.captcha.target_area.clone(),
        ));
        let verifier = Arc::new(TrajectoryVerifier::new(config.captcha.heuristics.clone()));

        Self {
            config,
            store: Arc::new(store),
            generator,
            verifier,
            stats: Arc::new(CaptchaStats::default()),
        }
    }
}
