//! Browser-automation boundary: disposable sessions and page rendering.

pub mod cdp;
pub mod dom;
pub mod session;

use anyhow::Result;
use async_trait::async_trait;
use dom::DomSnapshot;
use session::Session;
use std::time::Duration;

/// How long to wait for content before degrading to "probably empty".
#[derive(Debug, Clone)]
pub struct RenderWait {
    /// `data-testid` marker that signals the primary content has loaded.
    pub marker: String,
    /// Upper bound on waiting for the marker.
    pub timeout: Duration,
    /// Fixed fallback delay when the marker never appears.
    pub settle: Duration,
    /// Short scroll+delay cycles to trigger lazy-loaded content.
    pub scroll_cycles: u32,
}

impl Default for RenderWait {
    fn default() -> Self {
        Self {
            marker: "tweet".to_string(),
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(5),
            scroll_cycles: 2,
        }
    }
}

/// Capability of rendering one URL inside a disposable session and returning
/// a structural snapshot of its content.
///
/// Implementations must tear the session's browsing context down on every
/// exit path, success or failure.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, session: &Session, wait: &RenderWait)
        -> Result<DomSnapshot>;
}
