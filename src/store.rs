//! SQLite store for subscriptions, the delivered seen-set, and alert state.

use crate::types::{
    AlertDirection, PriceAlert, SourceType, TrackedEntity, TransferSide, WhaleMove,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Unknown source type: {0}")]
    UnknownSourceType(String),
}

/// Persisted store shared by all polling loops.
///
/// Every mutation is a keyed insert or upsert that is safe to retry. The
/// seen-set is append-only; rows are never deleted.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the SQLite database at the given URL, creating it and its
    /// tables if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_type TEXT NOT NULL,
                key TEXT NOT NULL,
                subscriber_id TEXT NOT NULL,
                watermark DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(source_type, key, subscriber_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Delivered social posts. post_id insertion is the unit of idempotence.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_posts (
                post_id TEXT PRIMARY KEY,
                handle TEXT NOT NULL,
                author TEXT NOT NULL,
                content TEXT NOT NULL,
                posted_at DATETIME NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscriber_id TEXT NOT NULL,
                mint TEXT NOT NULL,
                direction TEXT NOT NULL,
                threshold_usd REAL NOT NULL,
                tripped INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whale_moves (
                signature TEXT PRIMARY KEY,
                mint TEXT NOT NULL,
                wallet TEXT NOT NULL,
                amount REAL NOT NULL,
                usd_value REAL NOT NULL,
                side TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All subscriptions for one source type.
    pub async fn tracked(&self, source_type: SourceType) -> Result<Vec<TrackedEntity>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<DateTime<Utc>>, DateTime<Utc>)>(
            "SELECT source_type, key, subscriber_id, watermark, created_at
             FROM tracked_entities WHERE source_type = ?",
        )
        .bind(source_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(st, key, subscriber_id, watermark, created_at)| {
                let source_type = SourceType::from_str(&st)
                    .ok_or_else(|| StoreError::UnknownSourceType(st.clone()))?;
                Ok(TrackedEntity {
                    source_type,
                    key,
                    subscriber_id,
                    watermark,
                    created_at,
                })
            })
            .collect()
    }

    /// Register a subscription. The registration layer owns this in
    /// production; tests use it to seed state.
    pub async fn track(&self, entity: &TrackedEntity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_entities (source_type, key, subscriber_id, watermark)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(source_type, key, subscriber_id) DO NOTHING
            "#,
        )
        .bind(entity.source_type.as_str())
        .bind(&entity.key)
        .bind(&entity.subscriber_id)
        .bind(entity.watermark)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Batched seen-set lookup: which of these post ids were already delivered.
    pub async fn seen_keys(&self, keys: &[String]) -> Result<HashSet<String>, StoreError> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let placeholders = vec!["?"; keys.len()].join(",");
        let sql = format!(
            "SELECT post_id FROM seen_posts WHERE post_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for key in keys {
            query = query.bind(key);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Record a delivered post. Replaying the same post id is a no-op.
    pub async fn record_post(
        &self,
        post_id: &str,
        handle: &str,
        author: &str,
        content: &str,
        posted_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO seen_posts (post_id, handle, author, content, posted_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO NOTHING
            "#,
        )
        .bind(post_id)
        .bind(handle)
        .bind(author)
        .bind(content)
        .bind(posted_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Register a one-shot market-cap alert.
    pub async fn add_alert(
        &self,
        subscriber_id: &str,
        mint: &str,
        direction: AlertDirection,
        threshold_usd: f64,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO price_alerts (subscriber_id, mint, direction, threshold_usd) VALUES (?, ?, ?, ?)",
        )
        .bind(subscriber_id)
        .bind(mint)
        .bind(direction.as_str())
        .bind(threshold_usd)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// All alerts that have not yet fired.
    pub async fn active_alerts(&self) -> Result<Vec<PriceAlert>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String, String, f64)>(
            "SELECT id, subscriber_id, mint, direction, threshold_usd
             FROM price_alerts WHERE tripped = 0",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, subscriber_id, mint, direction, threshold_usd)| {
                let direction = AlertDirection::from_str(&direction)?;
                Some(PriceAlert {
                    id,
                    subscriber_id,
                    mint,
                    direction,
                    threshold_usd,
                })
            })
            .collect())
    }

    /// Permanently disable a fired alert. Never reset.
    pub async fn trip_alert(&self, alert_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE price_alerts SET tripped = 1 WHERE id = ?")
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a whale alert was already delivered for this signature.
    pub async fn signature_seen(&self, signature: &str) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM whale_moves WHERE signature = ?",
        )
        .bind(signature)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Record a delivered whale move, keyed by transaction signature.
    pub async fn record_whale_move(
        &self,
        signature: &str,
        whale: &WhaleMove,
    ) -> Result<(), StoreError> {
        let side = match whale.side {
            TransferSide::Buy => "buy",
            TransferSide::Sell => "sell",
        };
        sqlx::query(
            r#"
            INSERT INTO whale_moves (signature, mint, wallet, amount, usd_value, side)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(signature) DO NOTHING
            "#,
        )
        .bind(signature)
        .bind(&whale.mint)
        .bind(&whale.wallet)
        .bind(whale.amount)
        .bind(whale.usd_value)
        .bind(side)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
