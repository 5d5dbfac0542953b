//! Per-asset market data: open interest, funding, volume, and optional
//! order book liquidity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMarketData {
    pub coin: String,
    pub timestamp: DateTime<Utc>,

    pub mark_price: f64,
    pub oracle_price: f64,
    pub mid_price: f64,

    /// Open interest in base units.
    pub open_interest: f64,
    /// Open interest at mark, in quote currency.
    pub open_interest_usd: f64,

    pub volume_24h_usd: f64,
    pub volume_24h_base: f64,

    /// 1-hour funding rate.
    pub funding_rate: f64,
    /// `funding_rate * 24 * 365 * 100`.
    pub funding_rate_annualized: f64,
    pub premium: f64,

    pub prev_day_price: f64,
    pub price_change_24h_pct: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<BookLiquidity>,
}

/// Order book liquidity metrics for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLiquidity {
    pub coin: String,
    pub timestamp: DateTime<Utc>,

    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_percent: f64,

    /// Cumulative quote depth within 0.5/1/2% of mid.
    pub bid_depth_0_5_pct: f64,
    pub ask_depth_0_5_pct: f64,
    pub bid_depth_1_pct: f64,
    pub ask_depth_1_pct: f64,
    pub bid_depth_2_pct: f64,
    pub ask_depth_2_pct: f64,

    /// `(bid - ask) / (bid + ask)`: positive means more bids.
    pub imbalance_0_5_pct: f64,
    pub imbalance_1_pct: f64,
}
