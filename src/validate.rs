//! Input-shape validation, performed before any I/O is attempted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A Spotify track identifier: exactly 22 base62 characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer credential for upstream calls. Flows through per-request only,
/// is never persisted, and never appears in logs.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Validate a track ID: surrounding whitespace is trimmed, then the value
/// must be exactly 22 ASCII alphanumeric characters.
pub fn track_id(input: &str) -> Result<TrackId, ApiError> {
    let trimmed = input.trim();
    if trimmed.len() == 22 && trimmed.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(TrackId(trimmed.to_string()))
    } else {
        Err(ApiError::InvalidTrackId)
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Shape check for Spotify access tokens: URL-safe base64 characters,
/// typically 150-300 chars in practice, accepted between 50 and 500.
pub fn token_format(input: &str) -> bool {
    (50..=500).contains(&input.len()) && input.bytes().all(is_token_byte)
}

/// Shape check for refresh tokens, which can be shorter than access tokens.
pub fn refresh_token_format(input: &str) -> bool {
    (20..=500).contains(&input.len()) && input.bytes().all(is_token_byte)
}

/// Validate an OAuth state parameter. Returns `None` rather than failing
/// so the caller decides how to respond.
pub fn state_param(input: Option<&str>) -> Option<&str> {
    let state = input?;
    if (16..=64).contains(&state.len()) && state.bytes().all(is_token_byte) {
        Some(state)
    } else {
        None
    }
}

/// Extract and shape-check the bearer token from an Authorization header
/// value. The header must be `Bearer <token>` with a well-formed token.
pub fn bearer_token(header: Option<&str>) -> Result<AccessToken, ApiError> {
    let header = header.ok_or(ApiError::InvalidToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::InvalidToken)?;
    if token_format(token) {
        Ok(AccessToken(token.to_string()))
    } else {
        tracing::warn!("invalid token format received");
        Err(ApiError::InvalidToken)
    }
}
