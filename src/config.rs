/// Environment-driven configuration

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Credentials injected into every scraping session.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    /// Authenticated session cookie value.
    pub auth_token: String,
    /// Anti-forgery cookie value paired with the session token.
    pub csrf_token: String,
}

/// Webhook endpoints, one per alert category.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub tracked_posts: Option<String>,
    pub price_alerts: Option<String>,
    pub whale_moves: Option<String>,
}

/// Runtime configuration, collected once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path or `sqlite::memory:`.
    pub database_url: String,
    /// DevTools endpoint of the externally-managed browser, e.g. `http://127.0.0.1:9222`.
    pub devtools_url: String,
    /// Helius API key for the transfer feed.
    pub helius_api_key: String,
    pub channels: ChannelConfig,
    pub session: Option<SessionCredentials>,
    /// Social profile polling interval.
    pub social_interval: Duration,
    /// Price alert polling interval.
    pub price_interval: Duration,
    /// Whale transfer polling interval.
    pub whale_interval: Duration,
    /// Minimum USD value for a transfer to count as a whale move.
    pub whale_threshold_usd: f64,
    /// Per-entity cap on deliveries in a single tick.
    pub max_events_per_tick: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Only the database URL, DevTools endpoint and Helius key are required;
    /// a missing webhook disables its category for the tick (logged there),
    /// and intervals/thresholds fall back to defaults.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://solwatch.db".to_string());
        let devtools_url = env::var("DEVTOOLS_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9222".to_string());
        let helius_api_key = env::var("HELIUS_API_KEY").context("Missing HELIUS_API_KEY")?;

        let session = match (env::var("X_AUTH_TOKEN"), env::var("X_CSRF_TOKEN")) {
            (Ok(auth_token), Ok(csrf_token)) => Some(SessionCredentials {
                auth_token,
                csrf_token,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            devtools_url,
            helius_api_key,
            channels: ChannelConfig {
                tracked_posts: env::var("WEBHOOK_TRACKED_POSTS").ok(),
                price_alerts: env::var("WEBHOOK_PRICE_ALERTS").ok(),
                whale_moves: env::var("WEBHOOK_WHALE_MOVES").ok(),
            },
            session,
            social_interval: Duration::from_secs(env_u64("SOCIAL_POLL_SECS", 60)),
            price_interval: Duration::from_secs(env_u64("PRICE_POLL_SECS", 60)),
            whale_interval: Duration::from_secs(env_u64("WHALE_POLL_SECS", 120)),
            whale_threshold_usd: env_f64("WHALE_THRESHOLD_USD", 10_000.0),
            max_events_per_tick: env_u64("MAX_EVENTS_PER_TICK", 5) as usize,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
