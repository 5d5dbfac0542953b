//! Tiered retention for the historical store.
//!
//! Intended to run as a daily job:
//! - older than 30 days: delete
//! - 7 to 30 days: keep one row per asset per day (12:00 UTC)
//! - 1 to 7 days: keep top-of-hour rows
//! - last 24 hours: keep everything
//!
//! The same policy applies to `price_history`. Space is reclaimed with
//! VACUUM afterwards. Dry-run mode reports counts without mutating.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::sqlite::SqlitePool;

use crate::database::{format_timestamp, HistoricalStore};

/// Per-step deletion counts of one maintenance run.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub dry_run: bool,
    pub snapshots_expired: u64,
    pub snapshots_downsampled_daily: u64,
    pub snapshots_downsampled_hourly: u64,
    pub prices_expired: u64,
    pub prices_downsampled_daily: u64,
    pub prices_downsampled_hourly: u64,
    pub vacuumed: bool,
}

impl MaintenanceReport {
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.snapshots_expired
            + self.snapshots_downsampled_daily
            + self.snapshots_downsampled_hourly
            + self.prices_expired
            + self.prices_downsampled_daily
            + self.prices_downsampled_hourly
    }
}

struct RetentionStep {
    table: &'static str,
    predicate: String,
}

fn retention_steps(table: &'static str) -> Vec<RetentionStep> {
    let now = Utc::now();
    let cutoff_30d = format_timestamp(now - Duration::days(30));
    let cutoff_7d = format_timestamp(now - Duration::days(7));
    let cutoff_1d = format_timestamp(now - Duration::days(1));

    vec![
        RetentionStep {
            table,
            predicate: format!("timestamp < '{cutoff_30d}'"),
        },
        RetentionStep {
            table,
            predicate: format!(
                "timestamp < '{cutoff_7d}' AND timestamp >= '{cutoff_30d}' \
                 AND strftime('%H', timestamp) != '12'"
            ),
        },
        RetentionStep {
            table,
            predicate: format!(
                "timestamp < '{cutoff_1d}' AND timestamp >= '{cutoff_7d}' \
                 AND strftime('%M', timestamp) != '00'"
            ),
        },
    ]
}

async fn apply_step(pool: &SqlitePool, step: &RetentionStep, dry_run: bool) -> Result<u64> {
    if dry_run {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            step.table, step.predicate
        ))
        .fetch_one(pool)
        .await?;
        return Ok(u64::try_from(count).unwrap_or(0));
    }

    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE {}",
        step.table, step.predicate
    ))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Runs the tiered retention policy over snapshots and price history.
///
/// # Errors
/// Returns an error if a deletion or the VACUUM fails.
pub async fn run_maintenance(store: &HistoricalStore, dry_run: bool) -> Result<MaintenanceReport> {
    let pool = store.pool();
    let mut report = MaintenanceReport {
        dry_run,
        ..Default::default()
    };

    let snapshot_steps = retention_steps("snapshots");
    report.snapshots_expired = apply_step(pool, &snapshot_steps[0], dry_run).await?;
    report.snapshots_downsampled_daily = apply_step(pool, &snapshot_steps[1], dry_run).await?;
    report.snapshots_downsampled_hourly = apply_step(pool, &snapshot_steps[2], dry_run).await?;

    let price_steps = retention_steps("price_history");
    report.prices_expired = apply_step(pool, &price_steps[0], dry_run).await?;
    report.prices_downsampled_daily = apply_step(pool, &price_steps[1], dry_run).await?;
    report.prices_downsampled_hourly = apply_step(pool, &price_steps[2], dry_run).await?;

    if !dry_run {
        sqlx::query("VACUUM").execute(pool).await?;
        report.vacuumed = true;
    }

    tracing::info!(
        "maintenance {}: {} rows removed",
        if dry_run { "dry-run" } else { "complete" },
        report.total_deleted()
    );
    Ok(report)
}
