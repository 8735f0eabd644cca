//! Spotify Web API client.
//!
//! Data endpoints are called with the requesting user's bearer token;
//! the token-exchange endpoints authenticate with the app credentials.
//! Upstream outcomes are classified into [`UpstreamError`] here so raw
//! response bodies and headers never cross this boundary.

use std::time::Duration;

use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::validate::{AccessToken, TrackId};

pub const AUTH_URL: &str = "https://accounts.spotify.com";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Request timeout - don't hang forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Classified upstream outcome. One HTTP call per logical operation, no
/// automatic retries - retry policy belongs to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream token expired or invalid")]
    AuthExpired,
    #[error("resource not found upstream")]
    NotFound,
    #[error("rate limited upstream, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("upstream unavailable")]
    Unavailable,
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream protocol error")]
    Protocol,
}

/// Spotify API client. Cheap to clone; all clones share one connection
/// pool with a bounded request timeout.
#[derive(Clone)]
pub struct SpotifyClient {
    client: Client,
}

impl SpotifyClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
        })
    }

    /// Central GET handler: classifies every transport/status outcome.
    /// 204 maps to `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<Option<T>, UpstreamError> {
        let url = format!("{API_BASE}{path}");

        let res = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token.secret()))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = res.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if status.is_success() {
            return match res.json::<T>().await {
                Ok(body) => Ok(Some(body)),
                Err(e) => {
                    tracing::error!(error = %e, "unparseable spotify response body");
                    Err(UpstreamError::Protocol)
                }
            };
        }

        let retry_after = res
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let outcome = classify_status(status, retry_after.as_deref());

        match &outcome {
            UpstreamError::AuthExpired => {
                tracing::warn!("spotify token expired or invalid");
            }
            UpstreamError::RateLimited { retry_after } => {
                tracing::warn!(retry_after, "spotify rate limit hit");
            }
            UpstreamError::Unavailable => {
                tracing::error!(status = %status, "spotify server error");
            }
            UpstreamError::Protocol => {
                // Log for debugging but never forward the body.
                let body = res.text().await.unwrap_or_default();
                let snippet: String = body.chars().take(200).collect();
                tracing::error!(status = %status, body = %snippet, "spotify api error");
            }
            _ => {}
        }

        Err(outcome)
    }

    /// Detailed audio analysis for a track. This is the heavy endpoint -
    /// beats, segments, sections, possibly hundreds of kilobytes.
    pub async fn get_audio_analysis(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawAnalysis>, UpstreamError> {
        self.get_json(token, &format!("/audio-analysis/{}", track_id.as_str()))
            .await
    }

    /// High-level audio features (tempo, energy, etc.).
    pub async fn get_audio_features(
        &self,
        token: &AccessToken,
        track_id: &TrackId,
    ) -> Result<Option<RawFeatures>, UpstreamError> {
        self.get_json(token, &format!("/audio-features/{}", track_id.as_str()))
            .await
    }

    /// Current playback state; `Ok(None)` when nothing is playing.
    pub async fn get_current_playback(
        &self,
        token: &AccessToken,
    ) -> Result<Option<RawPlayback>, UpstreamError> {
        self.get_json(token, "/me/player/currently-playing").await
    }

    /// Exchange an authorization code for tokens during the OAuth callback.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        self.token_request(client_id, client_secret, &params).await
    }

    /// Obtain a fresh access token from a refresh token.
    pub async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenGrant, UpstreamError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(client_id, client_secret, &params).await
    }

    async fn token_request(
        &self,
        client_id: &str,
        client_secret: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, UpstreamError> {
        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("{client_id}:{client_secret}").as_bytes());

        let res = self
            .client
            .post(format!("{AUTH_URL}/api/token"))
            .header("Authorization", format!("Basic {auth}"))
            .form(params)
            .send()
            .await
            .map_err(classify_transport)?;

        let body: RawTokenResponse = res.json().await.map_err(|e| {
            tracing::error!(error = %e, "unparseable token response");
            UpstreamError::Protocol
        })?;

        if let Some(error) = body.error {
            tracing::warn!(error = %error, "token grant rejected");
            return Err(UpstreamError::AuthExpired);
        }
        let Some(access_token) = body.access_token else {
            tracing::error!("no access_token in spotify token response");
            return Err(UpstreamError::Protocol);
        };

        Ok(TokenGrant {
            access_token,
            expires_in: body.expires_in.unwrap_or(3600),
            refresh_token: body.refresh_token,
        })
    }
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        tracing::error!("spotify api timeout");
        UpstreamError::Timeout
    } else {
        // Network errors, DNS failures, etc. Log the kind, not the detail.
        tracing::error!(error = %err, "network error calling spotify");
        UpstreamError::Unavailable
    }
}

/// Fixed status-code classification for non-success, non-204 responses.
fn classify_status(status: StatusCode, retry_after: Option<&str>) -> UpstreamError {
    match status {
        StatusCode::UNAUTHORIZED => UpstreamError::AuthExpired,
        StatusCode::NOT_FOUND => UpstreamError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        s if s.is_server_error() => UpstreamError::Unavailable,
        _ => UpstreamError::Protocol,
    }
}

// ---------------------------------------------------------------------------
// Raw upstream payloads
//
// Untrusted partial schemas: every field is optional or defaulted so a
// sparse or malformed response degrades instead of failing. Field-level
// defaulting to visualizer values happens once, in the transformer.
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub track: RawTrackSummary,
    #[serde(default)]
    pub beats: Vec<RawBeat>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
    #[serde(default)]
    pub sections: Vec<RawSection>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawTrackSummary {
    pub duration: Option<f64>,
    pub tempo: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawBeat {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub loudness_start: Option<f64>,
    pub loudness: Option<f64>,
    pub pitches: Option<Vec<f64>>,
    pub timbre: Option<Vec<f64>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawSection {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub tempo: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub loudness: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawFeatures {
    pub tempo: Option<f64>,
    pub energy: Option<f64>,
    pub danceability: Option<f64>,
    pub valence: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawPlayback {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: u64,
    #[serde(default)]
    pub item: Option<RawTrack>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawTrack {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
    #[serde(default)]
    pub album: RawAlbum,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawArtist {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawAlbum {
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<RawImage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawImage {
    pub url: Option<String>,
}

/// Result of a successful token exchange or refresh.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    error: Option<String>,
}
