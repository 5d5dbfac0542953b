//! Data models and historical storage for the liquidation map collector.
//!
//! This crate provides:
//! - Models for liquidation levels, clusters, maps, and market data
//! - The SQLite-backed historical store with compressed cluster blobs
//! - Tiered retention maintenance and the compression migration
//! - CSV export of snapshot summaries

pub mod compression;
pub mod csv_export;
pub mod database;
pub mod maintenance;
pub mod migration;
pub mod models;

pub use compression::{compress_clusters, decompress_clusters, COMPRESSION_TAG};
pub use csv_export::export_snapshots_csv;
pub use database::{HistoricalStore, SnapshotRow, StoreStats};
pub use maintenance::{run_maintenance, MaintenanceReport};
pub use migration::{migrate_compress, MigrationReport};
pub use models::{
    AssetMarketData, BookLiquidity, ClusterDoc, LiquidationCluster, LiquidationLevel,
    LiquidationMap, Side,
};
