//! Disposable, fingerprint-randomized browsing sessions.

use crate::config::SessionCredentials;
use rand::seq::SliceRandom;
use tracing::debug;

/// Identity tuple applied to a browsing context before navigation.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint {
    pub viewport: (u32, u32),
    pub locale: &'static str,
    pub timezone: &'static str,
    pub user_agent: &'static str,
}

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1536, 864), (1440, 900), (1366, 768)];

const LOCALES: &[&str] = &["en-US", "en-GB"];

const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "Europe/London",
    "Europe/Berlin",
];

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Script injected before any page script runs; hides the obvious
/// automation signals the upstream checks for.
pub const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
window.chrome = window.chrome || { runtime: {} };
"#;

#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// One disposable session: a fingerprint plus authentication cookies,
/// consumed by exactly one fetch. The renderer tears down the backing
/// browser context on every exit path.
#[derive(Debug, Clone)]
pub struct Session {
    pub fingerprint: Fingerprint,
    pub cookies: Vec<Cookie>,
}

/// Issues a fresh randomized session per acquisition.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    credentials: Option<SessionCredentials>,
    cookie_domain: String,
}

impl SessionProvider {
    pub fn new(credentials: Option<SessionCredentials>) -> Self {
        Self {
            credentials,
            cookie_domain: ".x.com".to_string(),
        }
    }

    pub fn acquire(&self) -> Session {
        let mut rng = rand::thread_rng();
        let fingerprint = Fingerprint {
            viewport: *VIEWPORTS.choose(&mut rng).unwrap_or(&(1920, 1080)),
            locale: LOCALES.choose(&mut rng).copied().unwrap_or("en-US"),
            timezone: TIMEZONES
                .choose(&mut rng)
                .copied()
                .unwrap_or("America/New_York"),
            user_agent: USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]),
        };

        let mut cookies = Vec::new();
        if let Some(creds) = &self.credentials {
            cookies.push(Cookie {
                name: "auth_token".to_string(),
                value: creds.auth_token.clone(),
                domain: self.cookie_domain.clone(),
            });
            cookies.push(Cookie {
                name: "ct0".to_string(),
                value: creds.csrf_token.clone(),
                domain: self.cookie_domain.clone(),
            });
        }

        debug!(
            viewport = ?fingerprint.viewport,
            timezone = fingerprint.timezone,
            locale = fingerprint.locale,
            authenticated = !cookies.is_empty(),
            "Session acquired"
        );

        Session {
            fingerprint,
            cookies,
        }
    }
}
