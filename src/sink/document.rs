//! Document-database channel store
//!
//! Items are stored as JSON documents in SQLite, one row per (channel, item)
//! pair, so merging a batch is a per-row upsert and never needs the prior
//! collection in memory. Channel-level run metadata lives in its own table.
//!
//! The pool is created once in [`DocumentStore::connect`] and shared by every
//! call.

use super::ChannelSink;
use crate::error::{DatabaseError, Error, Result};
use crate::types::{ChannelInfo, ChannelStatus, ItemRecord, RunMeta, SinkKind};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::{FromRow, SqliteConnection};
use std::str::FromStr;

/// Per-channel aggregate over the stored items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel display name
    pub channel_name: String,
    /// Upstream channel identifier
    pub channel_id: String,
    /// Unique items stored
    pub item_count: u64,
    /// Sum of view counters
    pub total_views: u64,
    /// Publish time of the newest stored item
    pub latest_published: Option<DateTime<Utc>>,
    /// When the channel was last written
    pub last_ingested: Option<DateTime<Utc>>,
    /// Completion status of the latest run
    pub status: ChannelStatus,
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    channel_name: String,
    channel_id: String,
    status: String,
    updated_at: i64,
    item_count: i64,
    total_views: i64,
    latest_published: Option<String>,
}

/// SQLite-backed document store
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Connect to `url` (e.g. `sqlite:data/channels.db`) and apply migrations
    ///
    /// The database file is created if it does not exist.
    pub async fn connect(url: &str) -> Result<Self> {
        if !url.starts_with("sqlite:") {
            return Err(Error::Database(DatabaseError::ConnectionFailed(format!(
                "Unsupported database URL (expected sqlite:): {}",
                url
            ))));
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database URL: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Database(DatabaseError::ConnectionFailed(format!(
                        "Failed to create database directory: {}",
                        e
                    )))
                })?;
            }
        }

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let store = Self { pool };
        store.run_migrations().await?;
        tracing::info!(url, "document store connected");
        Ok(store)
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// All items stored for a channel, newest first
    pub async fn channel_items(&self, channel_name: &str) -> Result<Vec<ItemRecord>> {
        let documents: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT document FROM items
            WHERE channel_name = ?
            ORDER BY published_at DESC
            "#,
        )
        .bind(channel_name)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        documents
            .iter()
            .map(|doc| serde_json::from_str(doc).map_err(Error::from))
            .collect()
    }

    /// Number of stored items, for one channel or overall
    pub async fn item_count(&self, channel_name: Option<&str>) -> Result<u64> {
        let count: i64 = match channel_name {
            Some(name) => sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE channel_name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?,
            None => sqlx::query_scalar("SELECT COUNT(*) FROM items")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?,
        };
        Ok(count.max(0) as u64)
    }

    /// Per-channel aggregates, sorted by channel name
    pub async fn channels_summary(&self) -> Result<Vec<ChannelSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT c.channel_name, c.channel_id, c.status, c.updated_at,
                   COUNT(i.item_id) AS item_count,
                   COALESCE(SUM(i.view_count), 0) AS total_views,
                   MAX(i.published_at) AS latest_published
            FROM channels c
            LEFT JOIN items i ON i.channel_name = c.channel_name
            GROUP BY c.channel_name
            ORDER BY c.channel_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        rows.into_iter()
            .map(|row| -> Result<ChannelSummary> {
                Ok(ChannelSummary {
                    status: serde_json::from_str(&row.status)?,
                    latest_published: row
                        .latest_published
                        .as_deref()
                        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                        .map(|ts| ts.with_timezone(&Utc)),
                    last_ingested: DateTime::from_timestamp(row.updated_at, 0),
                    channel_name: row.channel_name,
                    channel_id: row.channel_id,
                    item_count: row.item_count.max(0) as u64,
                    total_views: row.total_views.max(0) as u64,
                })
            })
            .collect()
    }

    /// Remove a channel and its items; returns the number of items removed
    pub async fn delete_channel(&self, channel_name: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        let removed = sqlx::query("DELETE FROM items WHERE channel_name = ?")
            .bind(channel_name)
            .execute(&mut *tx)
            .await
            .map_err(Error::Sqlx)?
            .rows_affected();
        sqlx::query("DELETE FROM channels WHERE channel_name = ?")
            .bind(channel_name)
            .execute(&mut *tx)
            .await
            .map_err(Error::Sqlx)?;

        tx.commit().await.map_err(Error::Sqlx)?;
        tracing::info!(channel = channel_name, removed, "channel deleted from document store");
        Ok(removed)
    }

    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: channels and items tables with lookup indexes
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying document store migration v1");

        let statements = [
            r#"
            CREATE TABLE channels (
                channel_name TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                batch_size INTEGER NOT NULL,
                lookback_days INTEGER NOT NULL,
                item_cap INTEGER,
                run_started_at INTEGER NOT NULL,
                state TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE items (
                channel_name TEXT NOT NULL,
                item_id TEXT NOT NULL,
                published_at TEXT NOT NULL,
                view_count INTEGER NOT NULL DEFAULT 0,
                document TEXT NOT NULL,
                scraped_at INTEGER NOT NULL,
                PRIMARY KEY (channel_name, item_id)
            )
            "#,
            "CREATE INDEX idx_items_item_id ON items(item_id)",
            "CREATE INDEX idx_items_channel ON items(channel_name)",
            "CREATE INDEX idx_items_published ON items(published_at)",
        ];

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            for statement in statements {
                sqlx::query(statement)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to apply schema statement: {}",
                            e
                        )))
                    })?;
            }
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (1, ?)")
                .bind(Utc::now().timestamp())
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::MigrationFailed(format!(
                        "Failed to record migration v1: {}",
                        e
                    )))
                })?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Document store migration v1 complete");
        Ok(())
    }
}

#[async_trait]
impl ChannelSink for DocumentStore {
    fn kind(&self) -> SinkKind {
        SinkKind::Document
    }

    async fn begin_channel(&self, _channel: &ChannelInfo) -> Result<()> {
        Ok(())
    }

    async fn write_batch(
        &self,
        channel: &ChannelInfo,
        batch: &[ItemRecord],
        meta: &RunMeta,
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        let status = serde_json::to_string(&ChannelStatus::InProgress)?;
        let mut tx = self.pool.begin().await.map_err(Error::Sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO channels (
                channel_name, channel_id, batch_size, lookback_days, item_cap,
                run_started_at, state, status, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(channel_name) DO UPDATE SET
                channel_id = excluded.channel_id,
                batch_size = excluded.batch_size,
                lookback_days = excluded.lookback_days,
                item_cap = excluded.item_cap,
                run_started_at = excluded.run_started_at,
                state = excluded.state,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&channel.name)
        .bind(channel.id.as_str())
        .bind(meta.batch_size as i64)
        .bind(i64::from(meta.lookback_days))
        .bind(meta.item_cap.map(|cap| cap as i64))
        .bind(meta.started_at.timestamp())
        .bind(ChannelStatus::InProgress.label())
        .bind(&status)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Sqlx)?;

        for record in batch {
            sqlx::query(
                r#"
                INSERT INTO items (
                    channel_name, item_id, published_at, view_count, document, scraped_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(channel_name, item_id) DO UPDATE SET
                    published_at = excluded.published_at,
                    view_count = excluded.view_count,
                    document = excluded.document,
                    scraped_at = excluded.scraped_at
                "#,
            )
            .bind(&channel.name)
            .bind(&record.id)
            .bind(
                record
                    .published_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .bind(record.view_count.min(i64::MAX as u64) as i64)
            .bind(serde_json::to_string(record)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Sqlx)?;
        }

        tx.commit().await.map_err(Error::Sqlx)?;
        Ok(())
    }

    async fn finish_channel(&self, channel: &ChannelInfo, status: &ChannelStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE channels SET state = ?, status = ?, updated_at = ?
            WHERE channel_name = ?
            "#,
        )
        .bind(status.label())
        .bind(serde_json::to_string(status)?)
        .bind(Utc::now().timestamp())
        .bind(&channel.name)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;
        Ok(())
    }
}
