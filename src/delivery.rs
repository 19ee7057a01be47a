//! Webhook delivery sink: structured embed messages with send pacing.

use crate::market::{format_market_cap, TokenSnapshot};
use crate::types::{PostKind, PriceAlert, SocialPost, TransferSide, WhaleMove};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Pause between consecutive sends in one tick, to respect downstream
/// rate limits.
pub const SEND_PACING: Duration = Duration::from_secs(1);

const COLOR_POST: u32 = 0x1DA1F2;
const COLOR_REPOST: u32 = 0x17BF63;
const COLOR_QUOTE: u32 = 0x794BC4;
const COLOR_UP: u32 = 0x00FF00;
const COLOR_DOWN: u32 = 0xFF0000;

const MAX_DESCRIPTION: usize = 4000;
const MAX_QUOTE: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: DateTime<Utc>,
}

/// One structured message bound for an output channel.
#[derive(Debug, Clone, Serialize)]
pub struct AlertMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
}

/// Output channel boundary. Failures are reported, never retried here.
#[async_trait]
pub trait OutputChannel: Send + Sync {
    async fn send(&self, webhook_url: &str, message: &AlertMessage) -> Result<()>;
}

/// Discord-compatible webhook sink.
pub struct WebhookSink {
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OutputChannel for WebhookSink {
    async fn send(&self, webhook_url: &str, message: &AlertMessage) -> Result<()> {
        let response = self
            .client
            .post(webhook_url)
            .json(message)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("Webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Webhook rejected message: {}", status);
        }
        debug!(status = %status, "Alert delivered");
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

/// `9xQeAb…k3Lm` style short form for wallet addresses.
pub fn short_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 8 {
        return wallet.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Embed for a newly-delivered social post, colored by classification.
pub fn post_message(
    tracked_handle: &str,
    post: &SocialPost,
    post_id: &str,
    posted_at: DateTime<Utc>,
) -> AlertMessage {
    let deep_link = format!("https://x.com/{}/status/{}", post.author, post_id);

    let (title, description, color) = match post.kind {
        PostKind::Original => (
            format!("@{}", tracked_handle),
            truncate(&post.content, MAX_DESCRIPTION),
            COLOR_POST,
        ),
        PostKind::Repost => (
            format!("🔁 @{} reposted @{}", tracked_handle, post.author),
            truncate(&post.content, MAX_DESCRIPTION),
            COLOR_REPOST,
        ),
        PostKind::Quote => {
            let quoted = post
                .quoted_content
                .as_deref()
                .map(|q| format!("\n\n> {}", truncate(q, MAX_QUOTE)))
                .unwrap_or_default();
            (
                format!("💬 @{} quoted", tracked_handle),
                truncate(&format!("{}{}", post.content, quoted), MAX_DESCRIPTION),
                COLOR_QUOTE,
            )
        }
    };

    AlertMessage {
        content: None,
        embeds: vec![Embed {
            title: Some(title),
            description: Some(description),
            url: Some(deep_link),
            color,
            fields: vec![
                EmbedField {
                    name: "❤️ Likes".to_string(),
                    value: post.engagement.likes.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "🔁 Reposts".to_string(),
                    value: post.engagement.reposts.to_string(),
                    inline: true,
                },
            ],
            timestamp: posted_at,
        }],
    }
}

/// Embed for a fired one-shot price alert; pings the subscriber.
pub fn price_alert_message(alert: &PriceAlert, snapshot: &TokenSnapshot) -> AlertMessage {
    let color = match alert.direction {
        crate::types::AlertDirection::Above => COLOR_UP,
        crate::types::AlertDirection::Below => COLOR_DOWN,
    };

    AlertMessage {
        content: Some(format!("<@{}>", alert.subscriber_id)),
        embeds: vec![Embed {
            title: Some("🚨 Price Alert Triggered!".to_string()),
            description: Some(format!(
                "**{} ({})** market cap has gone **{}** {}",
                snapshot.name,
                snapshot.symbol,
                alert.direction.as_str(),
                format_market_cap(alert.threshold_usd),
            )),
            url: None,
            color,
            fields: vec![
                EmbedField {
                    name: "Current MC".to_string(),
                    value: format_market_cap(snapshot.market_cap),
                    inline: true,
                },
                EmbedField {
                    name: "Current Price".to_string(),
                    value: format!("${:.6}", snapshot.price_usd),
                    inline: true,
                },
                EmbedField {
                    name: "Target".to_string(),
                    value: format!(
                        "{} {}",
                        alert.direction.as_str(),
                        format_market_cap(alert.threshold_usd)
                    ),
                    inline: true,
                },
                EmbedField {
                    name: "Mint".to_string(),
                    value: format!("`{}`", alert.mint),
                    inline: false,
                },
            ],
            timestamp: Utc::now(),
        }],
    }
}

/// Embed for a detected whale move, deep-linked to the transaction.
pub fn whale_message(
    whale: &WhaleMove,
    snapshot: Option<&TokenSnapshot>,
    signature: &str,
) -> AlertMessage {
    let (name, symbol) = snapshot
        .map(|s| (s.name.as_str(), s.symbol.as_str()))
        .unwrap_or(("Unknown", "???"));
    let (verb, color) = match whale.side {
        TransferSide::Buy => ("Buy", COLOR_UP),
        TransferSide::Sell => ("Sell", COLOR_DOWN),
    };

    AlertMessage {
        content: None,
        embeds: vec![Embed {
            title: Some(format!("🐋 Whale {} Detected!", verb)),
            description: Some(format!("**{} ({})**", name, symbol)),
            url: Some(format!("https://solscan.io/tx/{}", signature)),
            color,
            fields: vec![
                EmbedField {
                    name: "Amount".to_string(),
                    value: format!("{:.0} {}", whale.amount, symbol),
                    inline: true,
                },
                EmbedField {
                    name: "Value".to_string(),
                    value: format!("${:.2}", whale.usd_value),
                    inline: true,
                },
                EmbedField {
                    name: "Wallet".to_string(),
                    value: format!("`{}`", short_wallet(&whale.wallet)),
                    inline: true,
                },
                EmbedField {
                    name: "Mint".to_string(),
                    value: format!("`{}`", whale.mint),
                    inline: false,
                },
            ],
            timestamp: Utc::now(),
        }],
    }
}
