pub mod liquidation;
pub mod market;

pub use liquidation::{ClusterDoc, LiquidationCluster, LiquidationLevel, LiquidationMap, Side};
pub use market::{AssetMarketData, BookLiquidity};
