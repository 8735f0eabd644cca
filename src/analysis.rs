//! Request-level coordination for the visualizer data endpoints:
//! validate -> cache lookup -> upstream fetch -> transform -> cache write.

use async_trait::async_trait;
use serde::Serialize;

use crate::cache::{AnalysisCache, CacheStats};
use crate::error::ApiError;
use crate::spotify::{
    RawAnalysis, RawFeatures, RawPlayback, RawTrack, SpotifyClient, UpstreamError,
};
use crate::transform::{transform, AnalysisResult};
use crate::validate::{AccessToken, TrackId};

/// Upstream data source seam; implemented by [`SpotifyClient`] and by
/// stubs in tests.
#[async_trait]
pub trait AnalysisSource: Send + Sync {
    async fn audio_analysis(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawAnalysis>, UpstreamError>;

    async fn audio_features(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawFeatures>, UpstreamError>;

    async fn current_playback(
        &self,
        token: &AccessToken,
    ) -> Result<Option<RawPlayback>, UpstreamError>;
}

#[async_trait]
impl AnalysisSource for SpotifyClient {
    async fn audio_analysis(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawAnalysis>, UpstreamError> {
        self.get_audio_analysis(token, track_id).await
    }

    async fn audio_features(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawFeatures>, UpstreamError> {
        self.get_audio_features(token, track_id).await
    }

    async fn current_playback(
        &self,
        token: &AccessToken,
    ) -> Result<Option<RawPlayback>, UpstreamError> {
        self.get_current_playback(token).await
    }
}

/// High-level audio features returned by `/spotify/features/{id}`.
#[derive(Clone, Debug, Serialize)]
pub struct AudioFeatures {
    pub tempo: f64,
    pub energy: f64,
    pub danceability: f64,
    pub valence: f64,
}

impl AudioFeatures {
    fn from_raw(raw: RawFeatures) -> Self {
        Self {
            tempo: raw.tempo.unwrap_or(120.0),
            energy: raw.energy.unwrap_or(0.5),
            danceability: raw.danceability.unwrap_or(0.5),
            valence: raw.valence.unwrap_or(0.5),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TrackInfo {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub album_art: Option<String>,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub progress_ms: u64,
    pub track: Option<TrackInfo>,
}

/// Coordinates the analysis pipeline over a data source and a cache.
pub struct AnalysisService<S, C> {
    source: S,
    cache: C,
}

impl<S: AnalysisSource, C: AnalysisCache> AnalysisService<S, C> {
    pub fn new(source: S, cache: C) -> Self {
        Self { source, cache }
    }

    /// Fetch (or serve from cache) the trimmed analysis for a track.
    ///
    /// Cache failures are absorbed: a read error degrades to a miss, a
    /// write error to a no-op, both observable only in logs. A features
    /// fetch failure degrades to transformer defaults; a missing
    /// analysis payload is fatal to the request.
    pub async fn get_analysis(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<AnalysisResult, ApiError> {
        match self.cache.get(track_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "cache read error, treating as miss"),
        }

        let analysis = match self.source.audio_analysis(token, track_id).await {
            Ok(Some(analysis)) => analysis,
            Ok(None) | Err(UpstreamError::NotFound) => {
                return Err(ApiError::NotFound("Track analysis"))
            }
            Err(e) => return Err(e.into()),
        };

        let features = match self.source.audio_features(token, track_id).await {
            Ok(features) => features,
            Err(e) => {
                tracing::warn!(error = %e, track_id = %track_id, "features fetch failed, using defaults");
                None
            }
        };

        let result = transform(track_id, analysis, features);

        if let Err(e) = self.cache.put(track_id, result.clone()).await {
            tracing::warn!(error = %e, "cache write error");
        }

        Ok(result)
    }

    /// Lighter weight than the full analysis; never cached.
    pub async fn get_features(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<AudioFeatures, ApiError> {
        match self.source.audio_features(token, track_id).await {
            Ok(Some(raw)) => Ok(AudioFeatures::from_raw(raw)),
            Ok(None) | Err(UpstreamError::NotFound) => Err(ApiError::NotFound("Track features")),
            Err(e) => Err(e.into()),
        }
    }

    /// Current playback state; `None` when nothing is playing.
    pub async fn get_playback(
        &self,
        token: &AccessToken,
    ) -> Result<Option<PlaybackState>, ApiError> {
        let playback = self.source.current_playback(token).await?;
        Ok(playback.map(|p| PlaybackState {
            is_playing: p.is_playing,
            progress_ms: p.progress_ms,
            track: p.item.map(extract_track_info),
        }))
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "cache stats unavailable");
            CacheStats { cached_tracks: 0 }
        })
    }
}

fn extract_track_info(track: RawTrack) -> TrackInfo {
    let artist = track
        .artists
        .into_iter()
        .next()
        .map(|a| a.name)
        .unwrap_or_else(|| "Unknown Artist".to_string());
    let album_art = track
        .album
        .images
        .into_iter()
        .next()
        .and_then(|image| image.url);

    TrackInfo {
        id: track.id,
        name: track.name.unwrap_or_else(|| "Unknown Track".to_string()),
        artist,
        album: track
            .album
            .name
            .unwrap_or_else(|| "Unknown Album".to_string()),
        album_art,
        duration_ms: track.duration_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use crate::spotify::{RawBeat, RawTrackSummary};
    use crate::validate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn track_id() -> TrackId {
        validate::track_id("4uLU6hMCjMI75M1A2tKUQC").unwrap()
    }

    fn token() -> AccessToken {
        validate::bearer_token(Some(&format!("Bearer {}", "x".repeat(100)))).unwrap()
    }

    fn sample_analysis() -> RawAnalysis {
        RawAnalysis {
            track: RawTrackSummary {
                duration: Some(180.0),
                tempo: Some(98.0),
            },
            beats: vec![RawBeat {
                start: 0.0,
                duration: 0.5,
                confidence: 0.9,
            }],
            segments: vec![],
            sections: vec![],
        }
    }

    /// Canned upstream with per-endpoint outcomes and call counting.
    struct StubSource {
        analysis: Result<Option<RawAnalysis>, UpstreamError>,
        features: Result<Option<RawFeatures>, UpstreamError>,
        analysis_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(
            analysis: Result<Option<RawAnalysis>, UpstreamError>,
            features: Result<Option<RawFeatures>, UpstreamError>,
        ) -> Self {
            Self {
                analysis,
                features,
                analysis_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AnalysisSource for StubSource {
        async fn audio_analysis(
            &self,
            _: &AccessToken,
            _: &TrackId,
        ) -> Result<Option<RawAnalysis>, UpstreamError> {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            self.analysis.clone()
        }

        async fn audio_features(
            &self,
            _: &AccessToken,
            _: &TrackId,
        ) -> Result<Option<RawFeatures>, UpstreamError> {
            self.features.clone()
        }

        async fn current_playback(
            &self,
            _: &AccessToken,
        ) -> Result<Option<RawPlayback>, UpstreamError> {
            Ok(None)
        }
    }

    /// A cache whose reads and writes always fail.
    struct BrokenCache;

    #[async_trait]
    impl AnalysisCache for BrokenCache {
        async fn get(&self, _: &TrackId) -> Result<Option<AnalysisResult>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn put(&self, _: &TrackId, _: AnalysisResult) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn stats(&self) -> Result<CacheStats, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn miss_fetches_transforms_and_caches() {
        let source = StubSource::new(
            Ok(Some(sample_analysis())),
            Ok(Some(RawFeatures {
                tempo: Some(128.0),
                energy: Some(0.7),
                ..Default::default()
            })),
        );
        let service = AnalysisService::new(source, MemoryCache::default());
        let id = track_id();

        let result = service.get_analysis(&token(), &id).await.unwrap();
        assert_eq!(result.tempo, 128.0);
        assert_eq!(result.beats.len(), 1);
        assert_eq!(service.cache_stats().await.cached_tracks, 1);

        // Second request is served from cache, no second upstream call.
        let again = service.get_analysis(&token(), &id).await.unwrap();
        assert_eq!(again, result);
        assert_eq!(service.source.analysis_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_analysis_is_not_found() {
        let source = StubSource::new(Ok(None), Ok(None));
        let service = AnalysisService::new(source, MemoryCache::default());

        let err = service.get_analysis(&token(), &track_id()).await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Track analysis"));
    }

    #[tokio::test]
    async fn auth_expiry_surfaces_before_features() {
        // The features stub would succeed; the analysis failure must not
        // be masked by it.
        let source = StubSource::new(
            Err(UpstreamError::AuthExpired),
            Ok(Some(RawFeatures::default())),
        );
        let service = AnalysisService::new(source, MemoryCache::default());

        let err = service.get_analysis(&token(), &track_id()).await.unwrap_err();
        assert_eq!(err, ApiError::AuthExpired);
    }

    #[tokio::test]
    async fn features_failure_degrades_to_defaults() {
        let source = StubSource::new(
            Ok(Some(sample_analysis())),
            Err(UpstreamError::Unavailable),
        );
        let service = AnalysisService::new(source, MemoryCache::default());

        let result = service.get_analysis(&token(), &track_id()).await.unwrap();
        // Analysis track tempo, default energy.
        assert_eq!(result.tempo, 98.0);
        assert_eq!(result.energy, 0.5);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_miss() {
        let source = StubSource::new(Ok(Some(sample_analysis())), Ok(None));
        let service = AnalysisService::new(source, BrokenCache);

        let result = service.get_analysis(&token(), &track_id()).await.unwrap();
        assert_eq!(result.duration, 180.0);
        assert_eq!(service.cache_stats().await.cached_tracks, 0);
    }

    #[tokio::test]
    async fn features_endpoint_defaults_and_not_found() {
        let source = StubSource::new(Ok(None), Ok(Some(RawFeatures::default())));
        let service = AnalysisService::new(source, MemoryCache::default());

        let features = service.get_features(&token(), &track_id()).await.unwrap();
        assert_eq!(features.tempo, 120.0);
        assert_eq!(features.energy, 0.5);
        assert_eq!(features.danceability, 0.5);
        assert_eq!(features.valence, 0.5);

        let source = StubSource::new(Ok(None), Ok(None));
        let service = AnalysisService::new(source, MemoryCache::default());
        let err = service.get_features(&token(), &track_id()).await.unwrap_err();
        assert_eq!(err, ApiError::NotFound("Track features"));
    }

    #[test]
    fn playback_track_extraction_defaults() {
        let info = extract_track_info(RawTrack::default());
        assert_eq!(info.name, "Unknown Track");
        assert_eq!(info.artist, "Unknown Artist");
        assert_eq!(info.album, "Unknown Album");
        assert_eq!(info.album_art, None);
    }
}
