//! Aggregates raw liquidation levels into price-bucket clusters and
//! builds the per-asset liquidation map.
//!
//! Levels are partitioned by side, bucketed by relative price, merged
//! where two adjacent clusters are both insignificant, and ordered so the
//! cluster nearest the current price comes first on each side.

use liqmap_core::config::MapConfig;
use liqmap_core::validation::DataValidator;
use liqmap_data::models::{LiquidationCluster, LiquidationLevel, LiquidationMap, Side};
use std::collections::{BTreeMap, HashMap};

pub struct LiquidationAggregator {
    bucket_percent: f64,
    min_cluster_size: f64,
    merge_gap_percent: f64,
    cluster_floor_usd: f64,
}

impl LiquidationAggregator {
    #[must_use]
    pub fn new(config: &MapConfig) -> Self {
        Self {
            bucket_percent: config.bucket_percent,
            min_cluster_size: config.min_cluster_size_usd,
            merge_gap_percent: config.merge_gap_percent,
            cluster_floor_usd: config.cluster_floor_usd,
        }
    }

    /// Bucket index of a price relative to the reference. Bucket b spans
    /// `[ref * (1 + b*B/100), ref * (1 + (b+1)*B/100))`; negative buckets
    /// sit below the reference.
    fn price_to_bucket(&self, price: f64, reference: f64) -> i64 {
        let pct_diff = (price - reference) / reference * 100.0;
        (pct_diff / self.bucket_percent).floor() as i64
    }

    fn bucket_range(&self, bucket: i64, reference: f64) -> (f64, f64) {
        let pct_low = bucket as f64 * self.bucket_percent;
        let pct_high = (bucket + 1) as f64 * self.bucket_percent;
        (
            reference * (1.0 + pct_low / 100.0),
            reference * (1.0 + pct_high / 100.0),
        )
    }

    /// Builds the liquidation map for one asset.
    #[must_use]
    pub fn aggregate_levels(
        &self,
        levels: &[LiquidationLevel],
        current_price: f64,
        coin: &str,
    ) -> LiquidationMap {
        if levels.is_empty() || current_price <= 0.0 {
            return LiquidationMap::empty(coin, current_price);
        }

        let long_levels: Vec<&LiquidationLevel> =
            levels.iter().filter(|l| l.side == Side::Long).collect();
        let short_levels: Vec<&LiquidationLevel> =
            levels.iter().filter(|l| l.side == Side::Short).collect();

        let mut long_clusters =
            self.clusters_for_side(&long_levels, current_price, Side::Long, coin);
        let mut short_clusters =
            self.clusters_for_side(&short_levels, current_price, Side::Short, coin);

        // A long bucket crossing the current price is reported, not
        // filtered; the venue's liquidation price is trusted.
        for cluster in &long_clusters {
            if cluster.price_high > current_price {
                tracing::warn!(
                    "{}: long liquidation cluster at {:.4} is above current {:.4}",
                    coin,
                    cluster.price_center,
                    current_price
                );
            }
        }
        for cluster in &short_clusters {
            if cluster.price_low < current_price {
                tracing::warn!(
                    "{}: short liquidation cluster at {:.4} is below current {:.4}",
                    coin,
                    cluster.price_center,
                    current_price
                );
            }
        }

        // Nearest first: longs descend toward zero, shorts ascend.
        long_clusters.sort_by(|a, b| b.price_center.total_cmp(&a.price_center));
        short_clusters.sort_by(|a, b| a.price_center.total_cmp(&b.price_center));

        let total_long: f64 = long_clusters.iter().map(|c| c.total_size_usd).sum();
        let total_short: f64 = short_clusters.iter().map(|c| c.total_size_usd).sum();

        let nearest_long = long_clusters
            .iter()
            .find(|c| c.total_size_usd >= self.min_cluster_size)
            .cloned();
        let nearest_short = short_clusters
            .iter()
            .find(|c| c.total_size_usd >= self.min_cluster_size)
            .cloned();

        LiquidationMap {
            coin: coin.to_string(),
            current_price,
            long_liquidations: long_clusters,
            short_liquidations: short_clusters,
            total_long_at_risk_usd: total_long,
            total_short_at_risk_usd: total_short,
            nearest_long_cluster: nearest_long,
            nearest_short_cluster: nearest_short,
        }
    }

    /// Buckets one side's levels, drops dust buckets, merges adjacent
    /// insignificant clusters, and drops clusters outside sanity bounds.
    fn clusters_for_side(
        &self,
        levels: &[&LiquidationLevel],
        reference: f64,
        side: Side,
        coin: &str,
    ) -> Vec<LiquidationCluster> {
        if levels.is_empty() {
            return Vec::new();
        }

        let mut buckets: BTreeMap<i64, Vec<&LiquidationLevel>> = BTreeMap::new();
        for level in levels.iter().copied() {
            buckets
                .entry(self.price_to_bucket(level.price, reference))
                .or_default()
                .push(level);
        }

        let mut clusters = Vec::new();
        for (bucket, bucket_levels) in buckets {
            let total_size: f64 = bucket_levels.iter().map(|l| l.size_usd).sum();
            if total_size < self.cluster_floor_usd {
                continue;
            }

            let (price_low, price_high) = self.bucket_range(bucket, reference);
            let avg_leverage = bucket_levels
                .iter()
                .map(|l| l.leverage * l.size_usd)
                .sum::<f64>()
                / total_size;

            clusters.push(LiquidationCluster {
                coin: coin.to_string(),
                side,
                price_low,
                price_high,
                price_center: (price_low + price_high) / 2.0,
                total_size_usd: total_size,
                position_count: bucket_levels.len(),
                avg_leverage,
            });
        }

        let merged = self.merge_adjacent(clusters);
        // Only the size bound can drop a cluster here; distance and
        // crossing produce warnings and the cluster stays in the map.
        merged
            .into_iter()
            .filter(|c| {
                DataValidator::validate_cluster(coin, c.price_center, c.total_size_usd, reference)
                    .log()
            })
            .collect()
    }

    /// Merges runs of adjacent insignificant clusters. Input and output
    /// are ordered by ascending center; a significant cluster always
    /// terminates a merge run.
    fn merge_adjacent(&self, clusters: Vec<LiquidationCluster>) -> Vec<LiquidationCluster> {
        let mut iter = clusters.into_iter();
        let Some(mut current) = iter.next() else {
            return Vec::new();
        };

        let mut merged = Vec::new();
        for next in iter {
            let gap_percent = (next.price_low - current.price_high) / current.price_center * 100.0;
            let should_merge = gap_percent < self.merge_gap_percent
                && current.total_size_usd < self.min_cluster_size
                && next.total_size_usd < self.min_cluster_size;

            if should_merge {
                let total_size = current.total_size_usd + next.total_size_usd;
                current = LiquidationCluster {
                    coin: current.coin,
                    side: current.side,
                    price_low: current.price_low,
                    price_high: next.price_high,
                    price_center: (current.price_low + next.price_high) / 2.0,
                    total_size_usd: total_size,
                    position_count: current.position_count + next.position_count,
                    avg_leverage: (current.avg_leverage * current.total_size_usd
                        + next.avg_leverage * next.total_size_usd)
                        / total_size,
                };
            } else {
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        merged
    }

    /// Builds maps for every asset present in `levels`. Assets without a
    /// known positive price are skipped.
    #[must_use]
    pub fn build_maps(
        &self,
        levels: &[LiquidationLevel],
        prices: &HashMap<String, f64>,
    ) -> HashMap<String, LiquidationMap> {
        let mut by_coin: HashMap<&str, Vec<LiquidationLevel>> = HashMap::new();
        for level in levels {
            by_coin.entry(&level.coin).or_default().push(level.clone());
        }

        let mut maps = HashMap::new();
        for (coin, coin_levels) in by_coin {
            let Some(&price) = prices.get(coin) else {
                tracing::debug!("{}: no price known, skipping map", coin);
                continue;
            };
            if price <= 0.0 {
                continue;
            }
            maps.insert(
                coin.to_string(),
                self.aggregate_levels(&coin_levels, price, coin),
            );
        }
        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liqmap_core::config::MapConfig;

    fn aggregator() -> LiquidationAggregator {
        LiquidationAggregator::new(&MapConfig::default())
    }

    fn level(coin: &str, side: Side, price: f64, size_usd: f64, leverage: f64) -> LiquidationLevel {
        LiquidationLevel {
            coin: coin.to_string(),
            side,
            price,
            size_usd,
            leverage,
            wallet: "0xabc".to_string(),
        }
    }

    #[test]
    fn empty_levels_yield_empty_map() {
        let map = aggregator().aggregate_levels(&[], 100.0, "BTC");

        assert!(map.long_liquidations.is_empty());
        assert!(map.short_liquidations.is_empty());
        assert!(map.total_long_at_risk_usd.abs() < f64::EPSILON);
        assert!(map.total_short_at_risk_usd.abs() < f64::EPSILON);
        assert!(map.nearest_long_cluster.is_none());
        assert!(map.nearest_short_cluster.is_none());
    }

    #[test]
    fn non_positive_price_yields_empty_map() {
        let levels = vec![level("BTC", Side::Long, 99.0, 60_000.0, 10.0)];
        let map = aggregator().aggregate_levels(&levels, 0.0, "BTC");
        assert!(map.long_liquidations.is_empty());
    }

    #[test]
    fn boundary_level_lands_in_bucket_minus_one() {
        // p = 99.9, current = 100, B = 0.1 -> bucket -1, center 99.95.
        let levels = vec![level("BTC", Side::Long, 99.9, 60_000.0, 10.0)];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        let cluster = &map.long_liquidations[0];
        assert!((cluster.price_low - 99.9).abs() < 1e-9);
        assert!((cluster.price_high - 100.0).abs() < 1e-9);
        assert!((cluster.price_center - 99.95).abs() < 1e-9);
    }

    #[test]
    fn dust_buckets_never_become_clusters() {
        let levels = vec![level("BTC", Side::Long, 99.0, 9_999.0, 10.0)];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");
        assert!(map.long_liquidations.is_empty());
        assert!(map.total_long_at_risk_usd.abs() < f64::EPSILON);
    }

    #[test]
    fn totals_equal_cluster_sums_per_side() {
        let levels = vec![
            level("BTC", Side::Long, 99.0, 60_000.0, 10.0),
            level("BTC", Side::Long, 95.0, 150_000.0, 20.0),
            level("BTC", Side::Short, 105.0, 80_000.0, 5.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        let long_sum: f64 = map
            .long_liquidations
            .iter()
            .map(|c| c.total_size_usd)
            .sum();
        let short_sum: f64 = map
            .short_liquidations
            .iter()
            .map(|c| c.total_size_usd)
            .sum();

        assert!((map.total_long_at_risk_usd - long_sum).abs() < 1e-6);
        assert!((map.total_short_at_risk_usd - short_sum).abs() < 1e-6);
        assert!((long_sum - 210_000.0).abs() < 1e-6);
        assert!((short_sum - 80_000.0).abs() < 1e-6);
    }

    #[test]
    fn sides_are_partitioned() {
        let levels = vec![
            level("BTC", Side::Long, 99.0, 60_000.0, 10.0),
            level("BTC", Side::Short, 101.0, 60_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert!(map
            .long_liquidations
            .iter()
            .all(|c| c.side == Side::Long));
        assert!(map
            .short_liquidations
            .iter()
            .all(|c| c.side == Side::Short));
        assert_eq!(map.long_liquidations.len(), 1);
        assert_eq!(map.short_liquidations.len(), 1);
    }

    #[test]
    fn merge_pair_of_insignificant_clusters() {
        // Two $60k long clusters two buckets apart: gap ~0.1% < 0.5%,
        // both below $100k, so they merge into one $120k cluster that
        // then clears the significance threshold.
        let levels = vec![
            level("BTC", Side::Long, 99.87, 60_000.0, 10.0), // bucket -2
            level("BTC", Side::Long, 99.65, 60_000.0, 20.0), // bucket -4
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        let merged = &map.long_liquidations[0];
        assert!((merged.total_size_usd - 120_000.0).abs() < 1e-6);
        assert_eq!(merged.position_count, 2);
        assert!((merged.price_low - 99.6).abs() < 1e-9);
        assert!((merged.price_high - 99.9).abs() < 1e-9);
        assert!((merged.price_center - 99.75).abs() < 1e-9);
        // Notional-weighted: equal sizes average the leverages.
        assert!((merged.avg_leverage - 15.0).abs() < 1e-9);

        let nearest = map.nearest_long_cluster.unwrap();
        assert!((nearest.total_size_usd - 120_000.0).abs() < 1e-6);
    }

    #[test]
    fn merged_pair_below_threshold_is_not_nearest() {
        let levels = vec![
            level("BTC", Side::Long, 99.87, 30_000.0, 10.0),
            level("BTC", Side::Long, 99.65, 30_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        assert!((map.long_liquidations[0].total_size_usd - 60_000.0).abs() < 1e-6);
        assert!(map.nearest_long_cluster.is_none());
    }

    #[test]
    fn significant_cluster_blocks_merge() {
        let levels = vec![
            level("BTC", Side::Long, 99.87, 500_000.0, 10.0),
            level("BTC", Side::Long, 99.65, 50_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 2);
        let sizes: Vec<f64> = map
            .long_liquidations
            .iter()
            .map(|c| c.total_size_usd)
            .collect();
        assert!(sizes.contains(&500_000.0));
        assert!(sizes.contains(&50_000.0));
    }

    #[test]
    fn no_adjacent_insignificant_pair_survives_merge() {
        // Many small clusters in consecutive buckets collapse until the
        // merge condition no longer holds anywhere.
        let levels: Vec<LiquidationLevel> = (0..6)
            .map(|i| {
                let price = 99.95 - 0.1 * f64::from(i);
                level("BTC", Side::Long, price, 20_000.0, 10.0)
            })
            .collect();
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        let mut by_center = map.long_liquidations.clone();
        by_center.sort_by(|a, b| a.price_center.total_cmp(&b.price_center));

        for pair in by_center.windows(2) {
            let gap_percent =
                (pair[1].price_low - pair[0].price_high) / pair[0].price_center * 100.0;
            let both_small =
                pair[0].total_size_usd < 100_000.0 && pair[1].total_size_usd < 100_000.0;
            assert!(
                !(gap_percent < 0.5 && both_small),
                "adjacent insignificant pair left unmerged"
            );
        }

        let total: f64 = map
            .long_liquidations
            .iter()
            .map(|c| c.total_size_usd)
            .sum();
        assert!((total - 120_000.0).abs() < 1e-6);
    }

    #[test]
    fn long_clusters_ordered_by_decreasing_center() {
        let levels = vec![
            level("BTC", Side::Long, 95.0, 150_000.0, 10.0),
            level("BTC", Side::Long, 99.0, 150_000.0, 10.0),
            level("BTC", Side::Long, 90.0, 150_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        let centers: Vec<f64> = map
            .long_liquidations
            .iter()
            .map(|c| c.price_center)
            .collect();
        assert_eq!(map.long_liquidations.len(), 3);
        assert!(centers.windows(2).all(|w| w[0] > w[1]));

        // Nearest long is the one closest below current.
        let nearest = map.nearest_long_cluster.unwrap();
        assert!((nearest.price_center - centers[0]).abs() < f64::EPSILON);
    }

    #[test]
    fn short_side_ordering_and_nearest_significant() {
        let levels = vec![
            level("BTC", Side::Short, 101.0, 20_000.0, 10.0),
            level("BTC", Side::Short, 103.0, 150_000.0, 10.0),
            level("BTC", Side::Short, 110.0, 60_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        let centers: Vec<f64> = map
            .short_liquidations
            .iter()
            .map(|c| c.price_center)
            .collect();
        assert_eq!(centers.len(), 3);
        assert!(centers.windows(2).all(|w| w[0] < w[1]));
        assert!(centers[0] > 101.0 && centers[0] < 101.1);

        // First significant cluster, not the first cluster.
        let nearest = map.nearest_short_cluster.unwrap();
        assert!((nearest.total_size_usd - 150_000.0).abs() < 1e-6);
        assert!(nearest.price_center > 103.0 && nearest.price_center < 103.2);
    }

    #[test]
    fn long_cluster_above_current_is_retained() {
        // The venue-reported liquidation price is trusted even when the
        // bucket lands on the "wrong" side of current.
        let levels = vec![level("BTC", Side::Long, 100.05, 60_000.0, 10.0)];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        assert!(map.long_liquidations[0].price_high > 100.0);
        assert!((map.total_long_at_risk_usd - 60_000.0).abs() < 1e-6);
    }

    #[test]
    fn far_crossing_cluster_is_retained_with_warning_only() {
        // A long liquidation reported more than 100% above current:
        // still mapped, still counted, never filtered.
        let levels = vec![level("BTC", Side::Long, 250.0, 150_000.0, 10.0)];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        assert!(map.long_liquidations[0].price_high > 100.0);
        assert!((map.total_long_at_risk_usd - 150_000.0).abs() < 1e-6);

        let nearest = map.nearest_long_cluster.unwrap();
        assert!((nearest.total_size_usd - 150_000.0).abs() < 1e-6);
    }

    #[test]
    fn absurd_cluster_is_dropped() {
        let levels = vec![
            level("BTC", Side::Long, 99.0, 2e10, 10.0),
            level("BTC", Side::Long, 95.0, 150_000.0, 10.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        assert!((map.total_long_at_risk_usd - 150_000.0).abs() < 1e-6);
    }

    #[test]
    fn build_maps_groups_by_coin_and_skips_unknown_prices() {
        let levels = vec![
            level("BTC", Side::Long, 64_000.0, 150_000.0, 10.0),
            level("ETH", Side::Short, 3_400.0, 150_000.0, 10.0),
            level("MISSING", Side::Long, 1.0, 150_000.0, 10.0),
        ];
        let mut prices = HashMap::new();
        prices.insert("BTC".to_string(), 65_000.0);
        prices.insert("ETH".to_string(), 3_300.0);

        let maps = aggregator().build_maps(&levels, &prices);

        assert_eq!(maps.len(), 2);
        assert!(maps.contains_key("BTC"));
        assert!(maps.contains_key("ETH"));
        assert!(!maps.contains_key("MISSING"));
        assert_eq!(maps["BTC"].long_liquidations.len(), 1);
        assert_eq!(maps["ETH"].short_liquidations.len(), 1);
    }

    #[test]
    fn weighted_leverage_uses_notional_weights() {
        // Same bucket: $100k at 10x and $50k at 40x -> (1e6 + 2e6) / 150k = 20x.
        let levels = vec![
            level("BTC", Side::Long, 99.01, 100_000.0, 10.0),
            level("BTC", Side::Long, 99.02, 50_000.0, 40.0),
        ];
        let map = aggregator().aggregate_levels(&levels, 100.0, "BTC");

        assert_eq!(map.long_liquidations.len(), 1);
        assert!((map.long_liquidations[0].avg_leverage - 20.0).abs() < 1e-9);
        assert_eq!(map.long_liquidations[0].position_count, 2);
    }
}
