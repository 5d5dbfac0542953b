//! One-shot migration that rewrites legacy uncompressed cluster blobs to
//! the tagged compressed form, in id-ordered batches.

use anyhow::Result;

use crate::compression::{compress_clusters, COMPRESSION_TAG};
use crate::database::HistoricalStore;
use crate::models::ClusterDoc;

/// Outcome of a compression migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub total_rows: u64,
    pub already_compressed: u64,
    pub candidates: u64,
    pub rewritten: u64,
    pub errors: u64,
}

/// Rewrites every untagged `clusters_blob` to the compressed form.
/// Dry-run reports the candidate count without touching rows.
///
/// # Errors
/// Returns an error if a query fails; individual unparseable rows are
/// counted and skipped.
pub async fn migrate_compress(
    store: &HistoricalStore,
    dry_run: bool,
    batch_size: i64,
) -> Result<MigrationReport> {
    let pool = store.pool();
    let mut report = MigrationReport {
        dry_run,
        ..Default::default()
    };

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM snapshots")
        .fetch_one(pool)
        .await?;
    report.total_rows = u64::try_from(total).unwrap_or(0);

    let tagged_pattern = format!("{COMPRESSION_TAG}%");
    let (compressed,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM snapshots WHERE clusters_blob LIKE ?1")
            .bind(&tagged_pattern)
            .fetch_one(pool)
            .await?;
    report.already_compressed = u64::try_from(compressed).unwrap_or(0);

    let (candidates,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM snapshots
         WHERE clusters_blob IS NOT NULL AND clusters_blob NOT LIKE ?1",
    )
    .bind(&tagged_pattern)
    .fetch_one(pool)
    .await?;
    report.candidates = u64::try_from(candidates).unwrap_or(0);

    if dry_run || report.candidates == 0 {
        tracing::info!(
            "compression migration {}: {} candidates of {} rows",
            if dry_run { "dry-run" } else { "no-op" },
            report.candidates,
            report.total_rows
        );
        return Ok(report);
    }

    // Walk by id so rows that fail to parse are never refetched.
    let mut last_id = 0i64;
    loop {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, clusters_blob FROM snapshots
             WHERE id > ?1 AND clusters_blob IS NOT NULL AND clusters_blob NOT LIKE ?2
             ORDER BY id
             LIMIT ?3",
        )
        .bind(last_id)
        .bind(&tagged_pattern)
        .bind(batch_size)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            break;
        }

        let mut tx = pool.begin().await?;
        for (id, blob) in rows {
            last_id = id;
            match serde_json::from_str::<ClusterDoc>(&blob) {
                Ok(doc) => {
                    let compressed = compress_clusters(&doc)?;
                    sqlx::query("UPDATE snapshots SET clusters_blob = ?1 WHERE id = ?2")
                        .bind(&compressed)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    report.rewritten += 1;
                }
                Err(e) => {
                    tracing::warn!("row {} has unparseable clusters_blob: {}", id, e);
                    report.errors += 1;
                }
            }
        }
        tx.commit().await?;
    }

    sqlx::query("VACUUM").execute(pool).await?;

    tracing::info!(
        "compression migration complete: {} rewritten, {} errors",
        report.rewritten,
        report.errors
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::decompress_clusters;
    use crate::database::format_timestamp;
    use crate::models::{LiquidationCluster, Side};
    use chrono::Utc;

    async fn insert_raw_snapshot(store: &HistoricalStore, asset: &str, blob: Option<&str>) {
        sqlx::query(
            "INSERT INTO snapshots
                (timestamp, asset, current_price, total_long_at_risk, total_short_at_risk,
                 clusters_blob)
             VALUES (?1, ?2, 65000.0, 0.0, 0.0, ?3)",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(asset)
        .bind(blob)
        .execute(store.pool())
        .await
        .unwrap();
    }

    fn legacy_blob() -> String {
        let doc = ClusterDoc {
            long: vec![LiquidationCluster {
                coin: "BTC".to_string(),
                side: Side::Long,
                price_low: 64_000.0,
                price_high: 64_065.0,
                price_center: 64_032.5,
                total_size_usd: 250_000.0,
                position_count: 5,
                avg_leverage: 10.0,
            }],
            short: vec![],
        };
        serde_json::to_string(&doc).unwrap()
    }

    #[tokio::test]
    async fn rewrites_untagged_rows() {
        let store = HistoricalStore::in_memory().await.unwrap();
        insert_raw_snapshot(&store, "BTC", Some(&legacy_blob())).await;

        let report = migrate_compress(&store, false, 100).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.errors, 0);

        let (blob,): (String,) =
            sqlx::query_as("SELECT clusters_blob FROM snapshots WHERE asset = 'BTC'")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert!(blob.starts_with(COMPRESSION_TAG));

        let doc = decompress_clusters(&blob).unwrap();
        assert_eq!(doc.long.len(), 1);
        assert_eq!(doc.long[0].position_count, 5);
    }

    #[tokio::test]
    async fn leaves_compressed_rows_alone() {
        let store = HistoricalStore::in_memory().await.unwrap();
        let compressed = compress_clusters(&ClusterDoc::default()).unwrap();
        insert_raw_snapshot(&store, "ETH", Some(&compressed)).await;

        let report = migrate_compress(&store, false, 100).await.unwrap();
        assert_eq!(report.already_compressed, 1);
        assert_eq!(report.candidates, 0);
        assert_eq!(report.rewritten, 0);
    }

    #[tokio::test]
    async fn dry_run_counts_only() {
        let store = HistoricalStore::in_memory().await.unwrap();
        insert_raw_snapshot(&store, "BTC", Some(&legacy_blob())).await;

        let report = migrate_compress(&store, true, 100).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.candidates, 1);
        assert_eq!(report.rewritten, 0);

        let (blob,): (String,) = sqlx::query_as("SELECT clusters_blob FROM snapshots")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(!blob.starts_with(COMPRESSION_TAG));
    }

    #[tokio::test]
    async fn unparseable_rows_are_skipped_not_looped() {
        let store = HistoricalStore::in_memory().await.unwrap();
        insert_raw_snapshot(&store, "BAD", Some("{broken json")).await;
        insert_raw_snapshot(&store, "BTC", Some(&legacy_blob())).await;

        let report = migrate_compress(&store, false, 1).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.rewritten, 1);
    }
}
