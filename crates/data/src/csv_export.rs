//! CSV export of snapshot summary rows for external analysis.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use csv::Writer;
use std::fs::File;

use crate::database::HistoricalStore;

fn opt_to_string(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes the summary columns of an asset's snapshots to `path`, oldest
/// first, covering the last 30 days.
///
/// # Errors
/// Returns an error if the query fails or the file cannot be written.
pub async fn export_snapshots_csv(
    store: &HistoricalStore,
    asset: &str,
    path: &str,
) -> Result<usize> {
    let end = Utc::now();
    let start = end - Duration::days(30);
    let mut rows = store.get_snapshots(asset, start, end, 10_000).await?;
    rows.sort_by_key(|r| r.timestamp);

    let file =
        File::create(path).with_context(|| format!("failed to create CSV file: {path}"))?;
    let mut writer = Writer::from_writer(file);

    writer.write_record([
        "timestamp",
        "asset",
        "current_price",
        "total_long_at_risk",
        "total_short_at_risk",
        "nearest_long_price",
        "nearest_long_size",
        "nearest_short_price",
        "nearest_short_size",
    ])?;

    let count = rows.len();
    for row in rows {
        writer.write_record(&[
            row.timestamp.to_rfc3339(),
            row.asset.clone(),
            row.current_price.to_string(),
            row.total_long_at_risk.to_string(),
            row.total_short_at_risk.to_string(),
            opt_to_string(row.nearest_long_price),
            opt_to_string(row.nearest_long_size),
            opt_to_string(row.nearest_short_price),
            opt_to_string(row.nearest_short_size),
        ])?;
    }

    writer.flush()?;
    Ok(count)
}
