//! HTTP handlers for the visualizer API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::analysis::AnalysisService;
use crate::auth;
use crate::cache::MemoryCache;
use crate::config::Config;
use crate::error::ApiError;
use crate::ratelimit::{client_ip, RateLimiter};
use crate::spotify::SpotifyClient;
use crate::validate;

/// Shared application state; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub spotify: SpotifyClient,
    pub analysis: Arc<AnalysisService<SpotifyClient, MemoryCache>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub states: Arc<auth::StateStore>,
}

impl AppState {
    /// Rate-limit gate plus bearer-token extraction, shared by all data
    /// endpoints.
    async fn admit(
        &self,
        headers: &HeaderMap,
        addr: &SocketAddr,
    ) -> Result<validate::AccessToken, ApiError> {
        self.rate_limiter.check(&client_ip(headers, addr)).await?;
        validate::bearer_token(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
        )
    }
}

/// GET /spotify/analysis/:track_id - processed audio analysis, cached.
pub async fn get_analysis(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(track_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.admit(&headers, &addr).await?;
    let track_id = validate::track_id(&track_id)?;

    let result = state.analysis.get_analysis(&token, &track_id).await?;
    Ok(Json(result))
}

/// GET /spotify/features/:track_id - high-level audio features.
pub async fn get_features(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(track_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.admit(&headers, &addr).await?;
    let track_id = validate::track_id(&track_id)?;

    let features = state.analysis.get_features(&token, &track_id).await?;
    Ok(Json(features))
}

/// GET /spotify/playback - current playback state, JSON null when
/// nothing is playing.
pub async fn get_playback(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.admit(&headers, &addr).await?;

    let playback = state.analysis.get_playback(&token).await?;
    Ok(Json(playback))
}

/// GET /health - health check with cache stats for monitoring.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.analysis.cache_stats().await;
    Json(json!({ "status": "healthy", "cache": cache }))
}

/// GET / - confirms the API is running.
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Spotify Visualizer API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/spotify/analysis/:track_id", get(get_analysis))
        .route("/spotify/features/:track_id", get(get_features))
        .route("/spotify/playback", get(get_playback))
        .layer(middleware::from_fn(security_headers))
}
