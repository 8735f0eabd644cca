use std::env;
use std::fmt;
use std::time::Duration;

/// Application configuration from environment variables.
///
/// Secrets never appear in logs or `Debug` output.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,
    pub frontend_url: String,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: u32,
    pub cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8000);

        let spotify_client_id = env::var("SPOTIFY_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_ID is required"))?
            .to_lowercase();
        // Spotify client IDs are 32 hex characters.
        if spotify_client_id.len() != 32
            || !spotify_client_id.bytes().all(|b| b.is_ascii_hexdigit())
        {
            anyhow::bail!("SPOTIFY_CLIENT_ID has an invalid format");
        }

        let spotify_client_secret = env::var("SPOTIFY_CLIENT_SECRET")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_SECRET is required"))?;
        if spotify_client_secret.len() < 20 {
            anyhow::bail!("SPOTIFY_CLIENT_SECRET appears invalid");
        }

        let spotify_redirect_uri = env::var("SPOTIFY_REDIRECT_URI")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_REDIRECT_URI is required"))?;

        let frontend_url = env::var("FRONTEND_URL")
            .map_err(|_| anyhow::anyhow!("FRONTEND_URL is required"))?
            .trim_end_matches('/')
            .to_string();

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]);

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let cache_ttl_hours: u64 = env::var("CACHE_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24 * 7);

        Ok(Self {
            port,
            spotify_client_id,
            spotify_client_secret,
            spotify_redirect_uri,
            frontend_url,
            allowed_origins,
            rate_limit_per_minute,
            cache_ttl: Duration::from_secs(cache_ttl_hours * 3600),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("spotify_client_id", &self.spotify_client_id)
            .field("spotify_client_secret", &"<redacted>")
            .field("spotify_redirect_uri", &self.spotify_redirect_uri)
            .field("frontend_url", &self.frontend_url)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}
