//! Scraping adapter for social profiles and live search.
//!
//! Extraction is purely structural: post containers, text bodies, timestamps,
//! permalinks and engagement controls are located by their `data-testid`
//! markers in the rendered snapshot. Anything missing degrades to a safe
//! placeholder rather than aborting the batch.

use crate::browser::dom::DomNode;
use crate::browser::session::SessionProvider;
use crate::browser::{PageRenderer, RenderWait};
use crate::types::{
    Engagement, ObservationPayload, PostKind, RawObservation, SocialPost, SourceType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_POSTS: usize = 10;

pub struct SocialAdapter {
    renderer: Arc<dyn PageRenderer>,
    sessions: SessionProvider,
    wait: RenderWait,
}

impl SocialAdapter {
    pub fn new(renderer: Arc<dyn PageRenderer>, sessions: SessionProvider) -> Self {
        Self {
            renderer,
            sessions,
            wait: RenderWait::default(),
        }
    }

    /// Most recent posts on a profile page, bounded to [`MAX_POSTS`].
    pub async fn fetch_profile(&self, handle: &str) -> Vec<RawObservation> {
        let url = format!("https://x.com/{}", handle);
        self.fetch(&url, handle).await
    }

    /// Most recent posts matching a live-search query.
    pub async fn search(&self, query: &str) -> Vec<RawObservation> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("https://x.com/search?q={}&src=typed_query&f=live", encoded);
        self.fetch(&url, query).await
    }

    async fn fetch(&self, url: &str, entity_key: &str) -> Vec<RawObservation> {
        // One disposable session per fetch; the renderer releases it on
        // every exit path.
        let session = self.sessions.acquire();

        let snapshot = match self.renderer.render(url, &session, &self.wait).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(entity = entity_key, error = %e, "Social fetch failed, returning empty batch");
                return Vec::new();
            }
        };

        let posts = extract_posts(&snapshot.root, entity_key);
        info!(entity = entity_key, count = posts.len(), "Scraped social posts");
        posts
    }
}

#[async_trait]
impl super::ObservationSource for SocialAdapter {
    async fn observe(&self, entity_key: &str) -> Vec<RawObservation> {
        self.fetch_profile(entity_key).await
    }
}

/// Walks top-level post containers in page order (most recent first).
fn extract_posts(root: &DomNode, entity_key: &str) -> Vec<RawObservation> {
    let mut out = Vec::new();
    for container in root.children.iter() {
        if container.test_id.as_deref() != Some("tweet") {
            continue;
        }
        match extract_post(container, entity_key) {
            Some(obs) => out.push(obs),
            None => debug!(entity = entity_key, "Skipping post without stable permalink"),
        }
        if out.len() >= MAX_POSTS {
            break;
        }
    }
    out
}

fn extract_post(container: &DomNode, entity_key: &str) -> Option<RawObservation> {
    let permalink = container.find_link("/status/")?;
    let (author, post_id) = parse_permalink(permalink.attr("href")?)?;

    let texts = container.find_all("tweetText");
    let content = texts
        .first()
        .map(|n| n.text_content())
        .unwrap_or_default();

    let timestamp = container
        .find_tag("time")
        .and_then(|t| t.attr("datetime"))
        .and_then(|dt| DateTime::parse_from_rfc3339(dt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    // A "reposted by" context marker implies a repost; a nested post
    // container implies a quote-repost.
    let is_repost = container
        .find("socialContext")
        .map(|node| {
            let context = node.text_content().to_lowercase();
            context.contains("repost") || context.contains("retweet")
        })
        .unwrap_or(false);
    let has_nested = container.find_all("tweet").len() > 1;

    let (kind, quoted_content) = if is_repost {
        (PostKind::Repost, None)
    } else if has_nested {
        (PostKind::Quote, texts.get(1).map(|n| n.text_content()))
    } else {
        (PostKind::Original, None)
    };

    let engagement = Engagement {
        replies: engagement_count(container, "reply"),
        reposts: engagement_count(container, "retweet"),
        likes: engagement_count(container, "like"),
    };

    Some(RawObservation {
        source_type: SourceType::Social,
        dedup_key: post_id,
        entity_key: entity_key.to_string(),
        timestamp,
        payload: ObservationPayload::Post(SocialPost {
            author,
            content,
            kind,
            quoted_content,
            engagement,
        }),
    })
}

/// `/alice/status/1234567890` -> ("alice", "1234567890").
fn parse_permalink(href: &str) -> Option<(String, String)> {
    let mut parts = href.split("/status/");
    let prefix = parts.next()?;
    let rest = parts.next()?;

    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        return None;
    }

    let author = prefix.rsplit('/').next()?.to_string();
    if author.is_empty() {
        return None;
    }
    Some((author, id))
}

/// Parses the leading count from an engagement control's accessible label,
/// e.g. `"1.2K Likes"`. Missing or unparseable labels count as zero.
fn engagement_count(container: &DomNode, control: &str) -> u64 {
    container
        .find(control)
        .and_then(|node| node.attr("aria-label"))
        .map(|label| {
            let token = label.split_whitespace().next().unwrap_or("");
            parse_compact_count(token)
        })
        .unwrap_or(0)
}

/// Abbreviated-number parsing: `K` multiplies by 1 000, `M` by 1 000 000,
/// plain values parse as integers, anything else is 0.
pub fn parse_compact_count(raw: &str) -> u64 {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return 0;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('K') | Some('k') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('M') | Some('m') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    number
        .parse::<f64>()
        .map(|value| (value * multiplier).round() as u64)
        .unwrap_or(0)
}
