//! Market data fetcher: open interest, funding, volume, and optional
//! order-book liquidity for the most active assets.

use anyhow::Result;
use chrono::{DateTime, Utc};
use liqmap_core::validation::DataValidator;
use liqmap_data::models::{AssetMarketData, BookLiquidity};
use liqmap_hyperliquid::types::{AssetCtx, BookLevel};
use liqmap_hyperliquid::HyperliquidClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// How many assets, ranked by open interest, get an order-book pull.
const LIQUIDITY_TOP_N: usize = 20;

pub struct MarketDataFetcher {
    client: Arc<HyperliquidClient>,
}

impl MarketDataFetcher {
    #[must_use]
    pub fn new(client: Arc<HyperliquidClient>) -> Self {
        Self { client }
    }

    /// Fetches market data for every asset in the universe. Assets whose
    /// context is missing a mark price are skipped.
    ///
    /// # Errors
    /// Returns an error if the metadata request fails.
    pub async fn fetch_all(&self, include_liquidity: bool) -> Result<HashMap<String, AssetMarketData>> {
        let timestamp = Utc::now();
        let (meta, ctxs) = self.client.meta_and_asset_ctxs().await?;

        let mut results = HashMap::new();
        for (asset_meta, ctx) in meta.universe.iter().zip(ctxs.iter()) {
            match build_asset_data(&asset_meta.name, ctx, timestamp) {
                Some(data) => {
                    DataValidator::validate_funding(&asset_meta.name, data.funding_rate).log();
                    results.insert(asset_meta.name.clone(), data);
                }
                None => {
                    tracing::debug!("{}: missing mark price, skipping", asset_meta.name);
                }
            }
        }

        if include_liquidity {
            let mut ranked: Vec<(String, f64)> = results
                .iter()
                .map(|(coin, data)| (coin.clone(), data.open_interest_usd))
                .collect();
            ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
            ranked.truncate(LIQUIDITY_TOP_N);

            for (coin, _) in ranked {
                match self.fetch_liquidity(&coin).await {
                    Ok(Some(liquidity)) => {
                        if let Some(data) = results.get_mut(&coin) {
                            data.liquidity = Some(liquidity);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("{}: liquidity fetch failed: {}", coin, e),
                }
                // Book pulls stay at least 100 ms apart.
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(results)
    }

    /// Computes order-book liquidity for one asset. Returns None when a
    /// side of the book is empty.
    ///
    /// # Errors
    /// Returns an error if the book request fails.
    pub async fn fetch_liquidity(&self, coin: &str) -> Result<Option<BookLiquidity>> {
        let (bids, asks) = self.client.l2_book(coin).await?;
        Ok(liquidity_from_book(coin, &bids, &asks, Utc::now()))
    }
}

/// Builds one asset's market data from its context. None when the mark
/// price is missing or non-positive.
#[must_use]
pub fn build_asset_data(
    coin: &str,
    ctx: &AssetCtx,
    timestamp: DateTime<Utc>,
) -> Option<AssetMarketData> {
    let mark_price = ctx.mark_px.filter(|p| *p > 0.0)?;

    let open_interest = ctx.open_interest.unwrap_or(0.0);
    let funding_rate = ctx.funding.unwrap_or(0.0);
    let prev_day_price = ctx.prev_day_px.unwrap_or(0.0);

    let price_change_24h_pct = if prev_day_price > 0.0 {
        (mark_price - prev_day_price) / prev_day_price * 100.0
    } else {
        0.0
    };

    Some(AssetMarketData {
        coin: coin.to_string(),
        timestamp,
        mark_price,
        oracle_price: ctx.oracle_px.unwrap_or(0.0),
        mid_price: ctx.mid_px.unwrap_or(0.0),
        open_interest,
        open_interest_usd: open_interest * mark_price,
        volume_24h_usd: ctx.day_ntl_vlm.unwrap_or(0.0),
        volume_24h_base: ctx.day_base_vlm.unwrap_or(0.0),
        funding_rate,
        funding_rate_annualized: funding_rate * 24.0 * 365.0 * 100.0,
        premium: ctx.premium.unwrap_or(0.0),
        prev_day_price,
        price_change_24h_pct,
        liquidity: None,
    })
}

/// Cumulative quote depth within `pct`% of mid on one side of the book.
fn depth_within(levels: &[BookLevel], mid: f64, pct: f64, is_bid: bool) -> f64 {
    let threshold = if is_bid {
        mid * (1.0 - pct / 100.0)
    } else {
        mid * (1.0 + pct / 100.0)
    };

    levels
        .iter()
        .filter(|level| {
            if is_bid {
                level.px >= threshold
            } else {
                level.px <= threshold
            }
        })
        .map(|level| level.px * level.sz)
        .sum()
}

fn imbalance(bid_depth: f64, ask_depth: f64) -> f64 {
    let total = bid_depth + ask_depth;
    if total > 0.0 {
        (bid_depth - ask_depth) / total
    } else {
        0.0
    }
}

/// Computes spread, tiered depth, and imbalance from a two-sided book.
#[must_use]
pub fn liquidity_from_book(
    coin: &str,
    bids: &[BookLevel],
    asks: &[BookLevel],
    timestamp: DateTime<Utc>,
) -> Option<BookLiquidity> {
    let best_bid = bids.first()?.px;
    let best_ask = asks.first()?.px;
    let mid = (best_bid + best_ask) / 2.0;
    if mid <= 0.0 {
        return None;
    }

    let bid_0_5 = depth_within(bids, mid, 0.5, true);
    let ask_0_5 = depth_within(asks, mid, 0.5, false);
    let bid_1 = depth_within(bids, mid, 1.0, true);
    let ask_1 = depth_within(asks, mid, 1.0, false);

    Some(BookLiquidity {
        coin: coin.to_string(),
        timestamp,
        best_bid,
        best_ask,
        spread_percent: (best_ask - best_bid) / mid * 100.0,
        bid_depth_0_5_pct: bid_0_5,
        ask_depth_0_5_pct: ask_0_5,
        bid_depth_1_pct: bid_1,
        ask_depth_1_pct: ask_1,
        bid_depth_2_pct: depth_within(bids, mid, 2.0, true),
        ask_depth_2_pct: depth_within(asks, mid, 2.0, false),
        imbalance_0_5_pct: imbalance(bid_0_5, ask_0_5),
        imbalance_1_pct: imbalance(bid_1, ask_1),
    })
}

/// Writes the market data file the dashboard reads: a JSON object keyed
/// by asset.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_market_file(path: &str, data: &HashMap<String, AssetMarketData>) -> Result<()> {
    use anyhow::Context as _;

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(data).context("serializing market data")?;
    std::fs::write(path, json).with_context(|| format!("writing market file {path}"))?;
    tracing::info!("saved market data for {} assets to {}", data.len(), path);
    Ok(())
}

struct CacheEntry {
    data: HashMap<String, AssetMarketData>,
    fetched_at: Instant,
}

/// Read-mostly cache over the most recent fetcher output: many readers,
/// one refresh writer, fixed TTL. The dashboard's in-memory accessor.
pub struct MarketCache {
    ttl: Duration,
    inner: RwLock<Option<CacheEntry>>,
}

impl MarketCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// The cached data if it is within TTL.
    pub async fn fresh(&self) -> Option<HashMap<String, AssetMarketData>> {
        let guard = self.inner.read().await;
        guard
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.data.clone())
    }

    /// The most recent data regardless of age.
    pub async fn latest(&self) -> Option<HashMap<String, AssetMarketData>> {
        let guard = self.inner.read().await;
        guard.as_ref().map(|entry| entry.data.clone())
    }

    /// Replaces the cached value. Called by the single refresh writer.
    pub async fn store(&self, data: HashMap<String, AssetMarketData>) {
        let mut guard = self.inner.write().await;
        *guard = Some(CacheEntry {
            data,
            fetched_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(json: serde_json::Value) -> AssetCtx {
        serde_json::from_value(json).unwrap()
    }

    fn book_level(px: f64, sz: f64) -> BookLevel {
        serde_json::from_value(serde_json::json!({"px": px.to_string(), "sz": sz.to_string(), "n": 1}))
            .unwrap()
    }

    #[test]
    fn builds_derived_metrics() {
        let ctx = ctx(serde_json::json!({
            "markPx": "100.0",
            "oraclePx": "99.8",
            "midPx": "100.1",
            "openInterest": "5000",
            "funding": "0.0000125",
            "prevDayPx": "80.0",
            "dayNtlVlm": "1500000",
            "dayBaseVlm": "15000",
            "premium": "0.0002"
        }));

        let data = build_asset_data("TEST", &ctx, Utc::now()).unwrap();

        assert!((data.open_interest_usd - 500_000.0).abs() < 1e-6);
        assert!((data.funding_rate_annualized - 0.0000125 * 24.0 * 365.0 * 100.0).abs() < 1e-9);
        assert!((data.price_change_24h_pct - 25.0).abs() < 1e-9);
        assert!((data.volume_24h_usd - 1_500_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_mark_price_skips_asset() {
        let ctx = ctx(serde_json::json!({"funding": "0.0001"}));
        assert!(build_asset_data("TEST", &ctx, Utc::now()).is_none());
    }

    #[test]
    fn zero_prev_day_price_means_no_change() {
        let ctx = ctx(serde_json::json!({"markPx": "100.0"}));
        let data = build_asset_data("TEST", &ctx, Utc::now()).unwrap();
        assert!(data.price_change_24h_pct.abs() < f64::EPSILON);
    }

    #[test]
    fn depth_tiers_accumulate_quote_size() {
        // Mid = 100. Bids at 99.9, 99.2, 97.5; asks at 100.1, 100.8, 102.5.
        let bids = vec![
            book_level(99.9, 1.0),
            book_level(99.2, 2.0),
            book_level(97.5, 4.0),
        ];
        let asks = vec![
            book_level(100.1, 1.0),
            book_level(100.8, 2.0),
            book_level(102.5, 4.0),
        ];

        let liq = liquidity_from_book("TEST", &bids, &asks, Utc::now()).unwrap();

        assert!((liq.best_bid - 99.9).abs() < f64::EPSILON);
        assert!((liq.best_ask - 100.1).abs() < f64::EPSILON);
        assert!((liq.spread_percent - 0.2).abs() < 1e-9);

        // Within 0.5%: only the top of book on each side.
        assert!((liq.bid_depth_0_5_pct - 99.9).abs() < 1e-9);
        assert!((liq.ask_depth_0_5_pct - 100.1).abs() < 1e-9);
        // Within 1%: the second level joins.
        assert!((liq.bid_depth_1_pct - (99.9 + 2.0 * 99.2)).abs() < 1e-9);
        assert!((liq.ask_depth_1_pct - (100.1 + 2.0 * 100.8)).abs() < 1e-9);
        // Within 2%: the deep levels are still outside.
        assert!((liq.bid_depth_2_pct - liq.bid_depth_1_pct).abs() < 1e-9);
        assert!((liq.ask_depth_2_pct - liq.ask_depth_1_pct).abs() < 1e-9);
    }

    #[test]
    fn imbalance_is_signed_and_bounded() {
        assert!((imbalance(300.0, 100.0) - 0.5).abs() < f64::EPSILON);
        assert!((imbalance(100.0, 300.0) + 0.5).abs() < f64::EPSILON);
        assert!(imbalance(0.0, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_book_side_yields_none() {
        let bids = vec![book_level(99.9, 1.0)];
        assert!(liquidity_from_book("TEST", &bids, &[], Utc::now()).is_none());
        assert!(liquidity_from_book("TEST", &[], &bids, Utc::now()).is_none());
    }

    #[tokio::test]
    async fn cache_respects_ttl() {
        let cache = MarketCache::new(Duration::from_millis(30));
        assert!(cache.fresh().await.is_none());
        assert!(cache.latest().await.is_none());

        cache.store(HashMap::new()).await;
        assert!(cache.fresh().await.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.fresh().await.is_none());
        // Stale data is still readable as the latest value.
        assert!(cache.latest().await.is_some());
    }
}
