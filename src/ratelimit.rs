//! Fixed-window request rate limiting keyed by client address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::ApiError;

const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    started: Instant,
    count: u32,
}

/// Explicitly-owned, injected counter store. Expired windows are swept
/// opportunistically on each check.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: WINDOW,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from the given client address.
    pub async fn check(&self, client_ip: &str) -> Result<(), ApiError> {
        let key = hash_key(client_ip);
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| w.started.elapsed() < self.window);

        let window = windows.entry(key).or_insert_with(|| Window {
            started: Instant::now(),
            count: 0,
        });

        if window.count >= self.limit {
            let retry_after = self
                .window
                .saturating_sub(window.started.elapsed())
                .as_secs()
                .max(1);
            tracing::warn!("rate limit exceeded");
            return Err(ApiError::TooManyRequests { retry_after });
        }

        window.count += 1;
        Ok(())
    }
}

/// Extract the client IP, preferring the first hop of X-Forwarded-For.
pub fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// Hash addresses so raw IPs never sit in the counter map or in logs.
fn hash_key(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    let mut key: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    key.truncate(16);
    key
}
