pub mod client;
pub mod de;
pub mod error;
pub mod types;
pub mod websocket;

pub use client::HyperliquidClient;
pub use error::{HyperliquidError, Result};
pub use types::{AssetCtx, AssetMeta, BookLevel, ClearinghouseState, Meta, Position, Trade};
pub use websocket::TradeStream;
