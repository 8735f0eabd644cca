//! Keyed, TTL-governed cache for transformed analysis results.
//!
//! Caching is an optimization, not a correctness dependency: callers
//! treat read failures as misses and write failures as no-ops. The
//! backend is swappable behind [`AnalysisCache`]; the in-memory store
//! here is the default.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::transform::AnalysisResult;
use crate::validate::TrackId;

/// 7 day TTL, matching how rarely a track's analysis changes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct CacheStats {
    pub cached_tracks: usize,
}

/// Store contract for transformed analysis, addressed by track ID.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Look up a live entry. Expired entries are reported absent even if
    /// the backend has not physically removed them yet.
    async fn get(&self, track_id: &TrackId) -> Result<Option<AnalysisResult>, CacheError>;

    /// Upsert: replaces any prior entry for the track and resets its age.
    async fn put(&self, track_id: &TrackId, value: AnalysisResult) -> Result<(), CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

struct CacheEntry {
    value: AnalysisResult,
    cached_at: Instant,
}

/// In-process cache: one live entry per track ID, lazy expiry on read
/// plus an opportunistic sweep on write.
pub struct MemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<TrackId, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_live(&self, entry: &CacheEntry) -> bool {
        entry.cached_at.elapsed() < self.ttl
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, track_id: &TrackId) -> Result<Option<AnalysisResult>, CacheError> {
        let entries = self.entries.read().await;
        match entries.get(track_id) {
            Some(entry) if self.is_live(entry) => {
                tracing::debug!(track_id = %track_id, "cache hit");
                Ok(Some(entry.value.clone()))
            }
            Some(_) | None => {
                tracing::debug!(track_id = %track_id, "cache miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, track_id: &TrackId, value: AnalysisResult) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        entries.insert(
            track_id.clone(),
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
        tracing::debug!(track_id = %track_id, "cached analysis");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.entries.read().await;
        let cached_tracks = entries.values().filter(|e| self.is_live(e)).count();
        Ok(CacheStats { cached_tracks })
    }
}
