//! Liquidation level, cluster, and map models.
//!
//! Levels are rebuilt every cycle from scanned positions; clusters and
//! maps are the aggregated output consumed by the dashboard file and the
//! historical store.

use serde::{Deserialize, Serialize};

/// Which side of the book a position sits on, derived from the sign of
/// its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// One wallet-position's projected forced-close price plus its notional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationLevel {
    pub coin: String,
    pub side: Side,
    pub price: f64,
    /// Notional at risk, in quote currency.
    pub size_usd: f64,
    pub leverage: f64,
    pub wallet: String,
}

/// Aggregation of levels sharing a narrow price range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationCluster {
    pub coin: String,
    pub side: Side,
    pub price_low: f64,
    pub price_high: f64,
    pub price_center: f64,
    pub total_size_usd: f64,
    pub position_count: usize,
    /// Notional-weighted across the merged levels.
    pub avg_leverage: f64,
}

impl LiquidationCluster {
    /// Width of the cluster's price range as a percentage of its center.
    #[must_use]
    pub fn price_range_percent(&self) -> f64 {
        if self.price_center == 0.0 {
            return 0.0;
        }
        (self.price_high - self.price_low) / self.price_center * 100.0
    }
}

/// Complete liquidation map for one asset and one cycle.
///
/// Field names are the wire contract of the latest-snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationMap {
    pub coin: String,
    pub current_price: f64,
    /// Ordered by decreasing center: nearest below current first.
    pub long_liquidations: Vec<LiquidationCluster>,
    /// Ordered by increasing center: nearest above current first.
    pub short_liquidations: Vec<LiquidationCluster>,
    pub total_long_at_risk_usd: f64,
    pub total_short_at_risk_usd: f64,
    pub nearest_long_cluster: Option<LiquidationCluster>,
    pub nearest_short_cluster: Option<LiquidationCluster>,
}

impl LiquidationMap {
    /// An empty map for an asset with no usable levels or price.
    #[must_use]
    pub fn empty(coin: &str, current_price: f64) -> Self {
        Self {
            coin: coin.to_string(),
            current_price,
            long_liquidations: Vec::new(),
            short_liquidations: Vec::new(),
            total_long_at_risk_usd: 0.0,
            total_short_at_risk_usd: 0.0,
            nearest_long_cluster: None,
            nearest_short_cluster: None,
        }
    }

    /// The cluster document persisted into the snapshot blob.
    #[must_use]
    pub fn cluster_doc(&self) -> ClusterDoc {
        ClusterDoc {
            long: self.long_liquidations.clone(),
            short: self.short_liquidations.clone(),
        }
    }
}

/// The `{long, short}` document stored compressed in `clusters_blob`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterDoc {
    #[serde(default)]
    pub long: Vec<LiquidationCluster>,
    #[serde(default)]
    pub short: Vec<LiquidationCluster>,
}
