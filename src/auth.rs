//! Spotify OAuth flow: login redirect, callback, token refresh, logout.
//!
//! The backend never stores user accounts; the access token goes to the
//! frontend, the refresh token into an httpOnly cookie.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::ratelimit::client_ip;
use crate::spotify::{self, UpstreamError};
use crate::validate;

/// Scopes requested from Spotify. `streaming` is for the frontend's Web
/// Playback SDK.
const SCOPES: &str =
    "user-read-playback-state user-read-currently-playing streaming user-read-email";

const STATE_TTL: Duration = Duration::from_secs(600);
const REFRESH_COOKIE: &str = "spotify_refresh";

/// Pending OAuth state tokens for CSRF protection. Injected store rather
/// than process-global; entries are single-use and swept on issue.
#[derive(Default)]
pub struct StateStore {
    pending: Mutex<HashMap<String, Instant>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new state token and record it as pending.
    pub async fn issue(&self) -> String {
        let state: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let mut pending = self.pending.lock().await;
        pending.retain(|_, issued| issued.elapsed() < STATE_TTL);
        pending.insert(state.clone(), Instant::now());
        state
    }

    /// Consume a state token. Valid exactly once, and only within the TTL.
    pub async fn consume(&self, state: &str) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.remove(state) {
            Some(issued) => issued.elapsed() < STATE_TTL,
            None => false,
        }
    }
}

/// GET /auth/login - redirect to Spotify's authorization page.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    state.rate_limiter.check(&client_ip(&headers, &addr)).await?;

    let csrf = state.states.issue().await;
    let config = &state.config;
    let params = format!(
        "client_id={}&response_type=code&redirect_uri={}&scope={}&state={}&show_dialog=false",
        config.spotify_client_id,
        urlencoding::encode(&config.spotify_redirect_uri),
        urlencoding::encode(SCOPES),
        csrf,
    );

    Ok(Redirect::temporary(&format!(
        "{}/authorize?{params}",
        spotify::AUTH_URL
    )))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /auth/callback - exchange the authorization code for tokens and
/// bounce back to the frontend. Every failure redirects with an error
/// tag; this endpoint never renders an error body.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Redirect) {
    let frontend = &state.config.frontend_url;

    if let Some(error) = query.error {
        tracing::warn!(error = %error, "oauth error from spotify");
        return (jar, Redirect::temporary(&format!("{frontend}?error=auth_denied")));
    }

    let Some(code) = query.code.filter(|c| (10..=500).contains(&c.len())) else {
        tracing::warn!("missing authorization code in callback");
        return (jar, Redirect::temporary(&format!("{frontend}?error=missing_code")));
    };

    let valid_state = validate::state_param(query.state.as_deref());
    let consumed = match valid_state {
        Some(s) => state.states.consume(s).await,
        None => false,
    };
    if !consumed {
        tracing::warn!("invalid or missing state parameter");
        return (jar, Redirect::temporary(&format!("{frontend}?error=invalid_state")));
    }

    let grant = match state
        .spotify
        .exchange_code(
            &state.config.spotify_client_id,
            &state.config.spotify_client_secret,
            &state.config.spotify_redirect_uri,
            &code,
        )
        .await
    {
        Ok(grant) => grant,
        Err(_) => {
            return (
                jar,
                Redirect::temporary(&format!("{frontend}?error=token_exchange_failed")),
            )
        }
    };

    // Access token goes to the frontend; the refresh token only ever
    // travels in an httpOnly cookie.
    let params = format!(
        "access_token={}&expires_in={}",
        urlencoding::encode(&grant.access_token),
        grant.expires_in,
    );
    let redirect = Redirect::temporary(&format!("{frontend}/callback?{params}"));

    let jar = match grant.refresh_token {
        Some(refresh) => jar.add(
            Cookie::build((REFRESH_COOKIE, refresh))
                .http_only(true)
                .secure(true)
                .same_site(SameSite::Lax)
                .path("/")
                .max_age(time::Duration::days(30))
                .build(),
        ),
        None => jar,
    };

    (jar, redirect)
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Returned after a successful refresh - never includes a refresh token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

/// POST /auth/refresh - trade a refresh token for a new access token.
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    state.rate_limiter.check(&client_ip(&headers, &addr)).await?;

    let refresh_token = request.refresh_token.trim();
    if !validate::refresh_token_format(refresh_token) {
        return Err(ApiError::InvalidToken);
    }

    match state
        .spotify
        .refresh_access_token(
            &state.config.spotify_client_id,
            &state.config.spotify_client_secret,
            refresh_token,
        )
        .await
    {
        Ok(grant) => Ok(Json(TokenResponse {
            access_token: grant.access_token,
            token_type: "Bearer",
            expires_in: grant.expires_in,
        })),
        Err(UpstreamError::AuthExpired) => Err(ApiError::AuthFailed),
        Err(e) => Err(e.into()),
    }
}

/// POST /auth/logout - clear the refresh cookie. Does not revoke the
/// Spotify grant; the user does that in their Spotify settings.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path("/"));
    (jar, Json(json!({ "message": "Logged out" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_tokens_are_single_use() {
        let store = StateStore::new();
        let state = store.issue().await;

        assert_eq!(state.len(), 32);
        assert!(state.bytes().all(|b| b.is_ascii_alphanumeric()));
        assert!(store.consume(&state).await);
        assert!(!store.consume(&state).await);
    }

    #[tokio::test]
    async fn unknown_states_are_rejected() {
        let store = StateStore::new();
        store.issue().await;
        assert!(!store.consume("AAAABBBBCCCCDDDDEEEEFFFFGGGGHHHH").await);
    }

    #[tokio::test]
    async fn issued_states_are_distinct() {
        let store = StateStore::new();
        let a = store.issue().await;
        let b = store.issue().await;
        assert_ne!(a, b);
    }
}
