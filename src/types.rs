use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which polling loop a tracked entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Scraped social profile or live-search query.
    Social,
    /// One-shot market-cap threshold alert on a watchlist mint.
    PriceAlert,
    /// On-chain transfer monitoring on a watchlist mint.
    Whale,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Social => "social",
            SourceType::PriceAlert => "price_alert",
            SourceType::Whale => "whale",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "social" => Some(SourceType::Social),
            "price_alert" => Some(SourceType::PriceAlert),
            "whale" => Some(SourceType::Whale),
            _ => None,
        }
    }
}

/// A (source type, key) pair one subscriber has registered for monitoring.
///
/// The registration layer owns the lifecycle of these rows; the workers only
/// read them. Several subscribers may track the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub source_type: SourceType,
    /// Handle for social entities, mint address for watchlist entities.
    pub key: String,
    pub subscriber_id: String,
    /// Subscription-start cutoff. Fixed at subscription time; observations at
    /// or before it are ignored forever. `None` for watchlist entities.
    pub watermark: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// How a scraped post relates to the account that surfaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostKind {
    Original,
    Repost,
    Quote,
}

/// Engagement counters parsed from a post's accessible labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub replies: u64,
    pub reposts: u64,
    pub likes: u64,
}

/// A scraped social post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    /// Original author; differs from the tracked handle on reposts.
    pub author: String,
    pub content: String,
    pub kind: PostKind,
    /// Body of the inner post on quote-reposts.
    pub quoted_content: Option<String>,
    pub engagement: Engagement,
}

/// A single on-chain token transfer referencing a watched mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleMove {
    pub mint: String,
    pub wallet: String,
    pub amount: f64,
    pub usd_value: f64,
    pub side: TransferSide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferSide {
    Buy,
    Sell,
}

/// One event observed at a source, produced fresh on every adapter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    pub source_type: SourceType,
    /// Stable identifier used for at-most-once delivery: post id, transaction
    /// signature, or alert row id.
    pub dedup_key: String,
    /// Key of the tracked entity that produced this observation.
    pub entity_key: String,
    pub timestamp: DateTime<Utc>,
    pub payload: ObservationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ObservationPayload {
    Post(SocialPost),
    Whale(WhaleMove),
}

/// Threshold direction for a one-shot price alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertDirection {
    Above,
    Below,
}

impl AlertDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertDirection::Above => "above",
            AlertDirection::Below => "below",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "above" => Some(AlertDirection::Above),
            "below" => Some(AlertDirection::Below),
            _ => None,
        }
    }
}

/// A registered market-cap alert. Once tripped it is permanently excluded
/// from evaluation; the flag never resets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceAlert {
    pub id: i64,
    pub subscriber_id: String,
    pub mint: String,
    pub direction: AlertDirection,
    pub threshold_usd: f64,
}
