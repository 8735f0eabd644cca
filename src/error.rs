use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::spotify::UpstreamError;

/// Application error taxonomy.
///
/// Every variant renders as a static, non-revealing message; the real
/// cause is logged server-side only. Clients can tell "bad input" from
/// "re-auth needed" from "try later", but never see internals.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid track ID format")]
    InvalidTrackId,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token expired. Please re-authenticate.")]
    AuthExpired,
    #[error("Authentication failed")]
    AuthFailed,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Rate limit exceeded. Please slow down.")]
    TooManyRequests { retry_after: u64 },
    #[error("Rate limited by Spotify. Try again shortly.")]
    UpstreamRateLimited { retry_after: u64 },
    #[error("Spotify is not responding. Try again.")]
    UpstreamTimeout,
    #[error("Spotify service temporarily unavailable")]
    UpstreamUnavailable,
    #[error("Request failed")]
    UpstreamProtocol,
    #[error("An unexpected error occurred")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidTrackId => StatusCode::BAD_REQUEST,
            ApiError::InvalidToken | ApiError::AuthExpired | ApiError::AuthFailed => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests { .. } | ApiError::UpstreamRateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::UpstreamTimeout
            | ApiError::UpstreamUnavailable
            | ApiError::UpstreamProtocol => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::TooManyRequests { retry_after }
            | ApiError::UpstreamRateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response =
            (status, Json(json!({ "detail": self.to_string() }))).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        if let Some(secs) = self.retry_after() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::AuthExpired => ApiError::AuthExpired,
            UpstreamError::NotFound => ApiError::NotFound("Track"),
            UpstreamError::RateLimited { retry_after } => {
                ApiError::UpstreamRateLimited { retry_after }
            }
            UpstreamError::Timeout => ApiError::UpstreamTimeout,
            UpstreamError::Unavailable => ApiError::UpstreamUnavailable,
            UpstreamError::Protocol => ApiError::UpstreamProtocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::InvalidTrackId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::AuthExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("Track").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::UpstreamRateLimited { retry_after: 30 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::UpstreamTimeout.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let response = ApiError::TooManyRequests { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from_static("42")
        );
    }

    #[test]
    fn unauthorized_response_carries_www_authenticate() {
        let response = ApiError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            &HeaderValue::from_static("Bearer")
        );
    }
}
