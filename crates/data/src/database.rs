//! SQLite-backed historical store.
//!
//! Append-only snapshot log keyed by (timestamp, asset); re-inserts with
//! the same key replace the row. Cluster arrays are stored as compressed
//! blobs. Timestamps are second-precision UTC strings in a fixed format
//! so retention cutoffs compare exactly.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::compression::{compress_clusters, decompress_clusters};
use crate::models::{ClusterDoc, LiquidationMap};

/// Stored timestamp format. Accepted by SQLite's date functions and by
/// RFC 3339 parsers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Formats a timestamp the way the store persists it.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
///
/// # Errors
/// Returns an error if the value is not a valid stored timestamp.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        asset TEXT NOT NULL,
        current_price REAL NOT NULL,
        total_long_at_risk REAL,
        total_short_at_risk REAL,
        nearest_long_price REAL,
        nearest_long_size REAL,
        nearest_short_price REAL,
        nearest_short_size REAL,
        clusters_blob TEXT,
        UNIQUE(timestamp, asset)
    )",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_asset_time
        ON snapshots(asset, timestamp)",
    "CREATE TABLE IF NOT EXISTS price_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        asset TEXT NOT NULL,
        price REAL NOT NULL,
        UNIQUE(timestamp, asset)
    )",
    "CREATE INDEX IF NOT EXISTS idx_price_asset_time
        ON price_history(asset, timestamp)",
    "CREATE TABLE IF NOT EXISTS liquidation_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        asset TEXT NOT NULL,
        price REAL NOT NULL,
        side TEXT NOT NULL,
        cluster_size REAL,
        price_move_percent REAL,
        time_to_hit_minutes REAL
    )",
];

/// One decoded snapshot row.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub current_price: f64,
    pub total_long_at_risk: f64,
    pub total_short_at_risk: f64,
    pub nearest_long_price: Option<f64>,
    pub nearest_long_size: Option<f64>,
    pub nearest_short_price: Option<f64>,
    pub nearest_short_size: Option<f64>,
    pub clusters: ClusterDoc,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RawSnapshotRow {
    timestamp: String,
    asset: String,
    current_price: f64,
    total_long_at_risk: Option<f64>,
    total_short_at_risk: Option<f64>,
    nearest_long_price: Option<f64>,
    nearest_long_size: Option<f64>,
    nearest_short_price: Option<f64>,
    nearest_short_size: Option<f64>,
    clusters_blob: Option<String>,
}

/// One recorded cluster-hit event.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LiquidationEventRow {
    pub timestamp: String,
    pub asset: String,
    pub price: f64,
    pub side: String,
    pub cluster_size: Option<f64>,
    pub price_move_percent: Option<f64>,
    pub time_to_hit_minutes: Option<f64>,
}

/// Storage statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub snapshot_count: i64,
    pub price_count: i64,
    pub event_count: i64,
    pub assets_tracked: i64,
    pub oldest_snapshot: Option<String>,
    pub newest_snapshot: Option<String>,
}

#[derive(Clone)]
pub struct HistoricalStore {
    pool: SqlitePool,
}

impl HistoricalStore {
    /// Opens (creating if missing) the store at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be initialized.
    pub async fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating data directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .with_context(|| format!("invalid database path: {path}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening historical store at {path}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an in-memory store. A single connection keeps every query on
    /// the same database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("opening in-memory store")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("initializing store schema")?;
        }
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Inserts one snapshot row per asset, atomically. Rows with the same
    /// (timestamp, asset) are replaced.
    ///
    /// # Errors
    /// Returns an error if compression or the transaction fails.
    pub async fn insert_snapshots(
        &self,
        maps: &HashMap<String, LiquidationMap>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let ts = format_timestamp(timestamp);
        let mut tx = self.pool.begin().await?;

        for (asset, map) in maps {
            let blob = compress_clusters(&map.cluster_doc())?;

            sqlx::query(
                "INSERT OR REPLACE INTO snapshots
                    (timestamp, asset, current_price, total_long_at_risk, total_short_at_risk,
                     nearest_long_price, nearest_long_size, nearest_short_price, nearest_short_size,
                     clusters_blob)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(&ts)
            .bind(asset)
            .bind(map.current_price)
            .bind(map.total_long_at_risk_usd)
            .bind(map.total_short_at_risk_usd)
            .bind(map.nearest_long_cluster.as_ref().map(|c| c.price_center))
            .bind(map.nearest_long_cluster.as_ref().map(|c| c.total_size_usd))
            .bind(map.nearest_short_cluster.as_ref().map(|c| c.price_center))
            .bind(map.nearest_short_cluster.as_ref().map(|c| c.total_size_usd))
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!("stored snapshot for {} assets at {}", maps.len(), ts);
        Ok(())
    }

    /// Inserts one price row per asset. Non-positive prices are skipped.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_prices(
        &self,
        prices: &HashMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let ts = format_timestamp(timestamp);
        let mut tx = self.pool.begin().await?;

        for (asset, price) in prices {
            if *price <= 0.0 {
                continue;
            }
            sqlx::query(
                "INSERT OR REPLACE INTO price_history (timestamp, asset, price)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&ts)
            .bind(asset)
            .bind(price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Records that price reached a liquidation cluster.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_liquidation_event(
        &self,
        asset: &str,
        price: f64,
        side: &str,
        cluster_size: f64,
        price_move_percent: f64,
        time_to_hit_minutes: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO liquidation_events
                (timestamp, asset, price, side, cluster_size, price_move_percent, time_to_hit_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(format_timestamp(timestamp))
        .bind(asset)
        .bind(price)
        .bind(side)
        .bind(cluster_size)
        .bind(price_move_percent)
        .bind(time_to_hit_minutes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches decoded snapshots for an asset, newest first.
    ///
    /// # Errors
    /// Returns an error if the query or blob decoding fails.
    pub async fn get_snapshots(
        &self,
        asset: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, RawSnapshotRow>(
            "SELECT timestamp, asset, current_price, total_long_at_risk, total_short_at_risk,
                    nearest_long_price, nearest_long_size, nearest_short_price, nearest_short_size,
                    clusters_blob
             FROM snapshots
             WHERE asset = ?1 AND timestamp BETWEEN ?2 AND ?3
             ORDER BY timestamp DESC
             LIMIT ?4",
        )
        .bind(asset)
        .bind(format_timestamp(start))
        .bind(format_timestamp(end))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::decode_row).collect()
    }

    fn decode_row(raw: RawSnapshotRow) -> Result<SnapshotRow> {
        let clusters = match raw.clusters_blob.as_deref() {
            Some(blob) if !blob.is_empty() => decompress_clusters(blob)?,
            _ => ClusterDoc::default(),
        };

        Ok(SnapshotRow {
            timestamp: parse_timestamp(&raw.timestamp)?,
            asset: raw.asset,
            current_price: raw.current_price,
            total_long_at_risk: raw.total_long_at_risk.unwrap_or(0.0),
            total_short_at_risk: raw.total_short_at_risk.unwrap_or(0.0),
            nearest_long_price: raw.nearest_long_price,
            nearest_long_size: raw.nearest_long_size,
            nearest_short_price: raw.nearest_short_price,
            nearest_short_size: raw.nearest_short_size,
            clusters,
        })
    }

    /// Fetches price history for an asset, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_price_history(
        &self,
        asset: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let rows = sqlx::query_as::<_, (String, f64)>(
            "SELECT timestamp, price FROM price_history
             WHERE asset = ?1 AND timestamp BETWEEN ?2 AND ?3
             ORDER BY timestamp",
        )
        .bind(asset)
        .bind(format_timestamp(start))
        .bind(format_timestamp(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(ts, price)| Ok((parse_timestamp(&ts)?, price)))
            .collect()
    }

    /// Fetches recorded cluster-hit events, newest first, optionally
    /// filtered by asset.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_liquidation_events(
        &self,
        asset: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LiquidationEventRow>> {
        let rows = match asset {
            Some(asset) => {
                sqlx::query_as::<_, LiquidationEventRow>(
                    "SELECT timestamp, asset, price, side, cluster_size,
                            price_move_percent, time_to_hit_minutes
                     FROM liquidation_events
                     WHERE asset = ?1 AND timestamp BETWEEN ?2 AND ?3
                     ORDER BY timestamp DESC",
                )
                .bind(asset)
                .bind(format_timestamp(start))
                .bind(format_timestamp(end))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, LiquidationEventRow>(
                    "SELECT timestamp, asset, price, side, cluster_size,
                            price_move_percent, time_to_hit_minutes
                     FROM liquidation_events
                     WHERE timestamp BETWEEN ?1 AND ?2
                     ORDER BY timestamp DESC",
                )
                .bind(format_timestamp(start))
                .bind(format_timestamp(end))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Row counts and time range.
    ///
    /// # Errors
    /// Returns an error if a count query fails.
    pub async fn stats(&self) -> Result<StoreStats> {
        let snapshot_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        let price_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_history")
            .fetch_one(&self.pool)
            .await?;
        let event_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM liquidation_events")
            .fetch_one(&self.pool)
            .await?;
        let assets_tracked: (i64,) =
            sqlx::query_as("SELECT COUNT(DISTINCT asset) FROM snapshots")
                .fetch_one(&self.pool)
                .await?;
        let range: (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM snapshots")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreStats {
            snapshot_count: snapshot_count.0,
            price_count: price_count.0,
            event_count: event_count.0,
            assets_tracked: assets_tracked.0,
            oldest_snapshot: range.0,
            newest_snapshot: range.1,
        })
    }
}
