//! Wire types for the info endpoint and the parsed position model.

use serde::{Deserialize, Serialize};

use crate::de;

/// Positions smaller than this in base units are dust and never parsed.
pub const DUST_SIZE: f64 = 1e-4;

/// Exchange metadata: the tradable universe.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    #[serde(default)]
    pub sz_decimals: u32,
    #[serde(default)]
    pub is_delisted: bool,
}

fn default_max_leverage() -> u32 {
    1
}

/// Per-asset market context, positionally aligned with `Meta::universe`.
///
/// Every numeric field decodes leniently so a single malformed asset never
/// fails a whole `metaAndAssetCtxs` call; consumers skip assets whose
/// required fields are missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub mark_px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub oracle_px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub mid_px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub open_interest: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub funding: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub prev_day_px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub day_ntl_vlm: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub day_base_vlm: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub premium: Option<f64>,
}

/// A wallet's margin state as reported by `clearinghouseState`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearinghouseState {
    #[serde(rename = "assetPositions", default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    #[serde(default)]
    pub position: Option<PositionData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    #[serde(default)]
    pub coin: String,
    /// Signed size: positive = long, negative = short.
    #[serde(deserialize_with = "de::f64_from_string_or_number")]
    pub szi: f64,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub entry_px: Option<f64>,
    #[serde(default)]
    pub leverage: LeverageInfo,
    #[serde(default, deserialize_with = "de::liquidation_px")]
    pub liquidation_px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub position_value: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub unrealized_pnl: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub margin_used: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageInfo {
    #[serde(default = "default_leverage", deserialize_with = "de::f64_from_string_or_number")]
    pub value: f64,
}

fn default_leverage() -> f64 {
    1.0
}

impl Default for LeverageInfo {
    fn default() -> Self {
        Self {
            value: default_leverage(),
        }
    }
}

/// One trade from `recentTrades` or the trades websocket channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Trade {
    #[serde(default)]
    pub coin: String,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub px: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64_lenient")]
    pub sz: Option<f64>,
    #[serde(default)]
    pub time: Option<i64>,
    /// The two counterparty addresses.
    #[serde(default)]
    pub users: Vec<String>,
}

/// One order book level: price, size, order count.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    #[serde(deserialize_with = "de::f64_from_string_or_number")]
    pub px: f64,
    #[serde(deserialize_with = "de::f64_from_string_or_number")]
    pub sz: f64,
    #[serde(default)]
    pub n: u32,
}

/// Raw `l2Book` payload: side 0 bids descending, side 1 asks ascending.
#[derive(Debug, Clone, Deserialize)]
pub struct L2Book {
    #[serde(default)]
    pub levels: Vec<Vec<BookLevel>>,
}

/// A parsed wallet position.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub wallet: String,
    pub coin: String,
    /// Signed size: positive = long, negative = short.
    pub size: f64,
    pub entry_price: f64,
    /// Absent for unleveraged or over-margined positions.
    pub liquidation_price: Option<f64>,
    pub leverage: f64,
    /// |size| at mark, in quote currency.
    pub notional_value: f64,
    pub unrealized_pnl: f64,
    pub margin_used: f64,
}

impl Position {
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }

    /// Parses the positions of one clearinghouse state, skipping dust.
    #[must_use]
    pub fn from_state(wallet: &str, state: ClearinghouseState) -> Vec<Position> {
        let mut positions = Vec::new();
        for asset_position in state.asset_positions {
            let Some(data) = asset_position.position else {
                continue;
            };
            if data.szi.abs() < DUST_SIZE {
                continue;
            }
            positions.push(Position {
                wallet: wallet.to_string(),
                coin: data.coin,
                size: data.szi,
                entry_price: data.entry_px.unwrap_or(0.0),
                liquidation_price: data.liquidation_px,
                leverage: data.leverage.value,
                notional_value: data.position_value.unwrap_or(0.0).abs(),
                unrealized_pnl: data.unrealized_pnl.unwrap_or(0.0),
                margin_used: data.margin_used.unwrap_or(0.0),
            });
        }
        positions
    }
}
