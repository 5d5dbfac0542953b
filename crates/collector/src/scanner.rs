//! Position scanner: fans wallet queries out through the shared client
//! under its rate budget and projects liquidation levels.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use liqmap_core::config::ScanConfig;
use liqmap_core::validation::DataValidator;
use liqmap_data::models::{LiquidationLevel, Side};
use liqmap_hyperliquid::{HyperliquidClient, Position};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Aggregated output of one wallet scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub timestamp: DateTime<Utc>,
    pub wallets_scanned: usize,
    pub positions_found: usize,
    pub total_long_exposure_usd: f64,
    pub total_short_exposure_usd: f64,
    pub liquidation_levels: Vec<LiquidationLevel>,
    pub positions_by_coin: HashMap<String, Vec<Position>>,
    pub errors: usize,
}

pub struct PositionScanner {
    client: Arc<HyperliquidClient>,
    batch_size: usize,
    max_wallets: usize,
    min_position_usd: f64,
    // At most one scan in progress per scanner instance.
    scan_lock: Mutex<()>,
}

impl PositionScanner {
    #[must_use]
    pub fn new(client: Arc<HyperliquidClient>, config: &ScanConfig, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            max_wallets: config.max_wallets,
            min_position_usd: config.min_position_usd,
            scan_lock: Mutex::new(()),
        }
    }

    /// Scans the wallet set in rate-budget batches. Per-wallet failures
    /// are counted and contribute nothing. The client's limiter remains
    /// the authoritative gate; the batch size only shapes the fan-out.
    ///
    /// # Errors
    /// Infallible today; the signature leaves room for fatal failures.
    pub async fn scan(&self, wallets: &HashSet<String>) -> anyhow::Result<ScanResult> {
        let _guard = self.scan_lock.lock().await;
        let timestamp = Utc::now();

        let mut wallet_list: Vec<&String> = wallets.iter().collect();
        wallet_list.truncate(self.max_wallets);
        let total = wallet_list.len();

        tracing::info!("scanning {} wallets", total);

        let mut positions_by_coin: HashMap<String, Vec<Position>> = HashMap::new();
        let mut liquidation_levels = Vec::new();
        let mut total_long = 0.0;
        let mut total_short = 0.0;
        let mut positions_found = 0usize;
        let mut errors = 0usize;

        for batch in wallet_list.chunks(self.batch_size) {
            let queries = batch
                .iter()
                .map(|wallet| self.client.user_positions(wallet.as_str()));
            let results = join_all(queries).await;

            for (wallet, result) in batch.iter().zip(results) {
                let positions = match result {
                    Ok(positions) => positions,
                    Err(e) => {
                        tracing::debug!("wallet {} scan failed: {}", wallet, e);
                        errors += 1;
                        continue;
                    }
                };

                for position in positions {
                    if position.notional_value < self.min_position_usd {
                        continue;
                    }

                    if position.is_long() {
                        total_long += position.notional_value;
                    } else {
                        total_short += position.notional_value;
                    }
                    positions_found += 1;

                    if let Some(level) = level_from_position(&position) {
                        liquidation_levels.push(level);
                    }
                    positions_by_coin
                        .entry(position.coin.clone())
                        .or_default()
                        .push(position);
                }
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::info!(
            "scan complete: {} positions, {} levels, {} errors, long ${:.0}, short ${:.0}",
            positions_found,
            liquidation_levels.len(),
            errors,
            total_long,
            total_short
        );

        Ok(ScanResult {
            timestamp,
            wallets_scanned: total,
            positions_found,
            total_long_exposure_usd: total_long,
            total_short_exposure_usd: total_short,
            liquidation_levels,
            positions_by_coin,
            errors,
        })
    }
}

/// Projects a position onto its liquidation level, if it has one.
/// Positions failing the validation bounds are dropped with a log entry.
#[must_use]
pub fn level_from_position(position: &Position) -> Option<LiquidationLevel> {
    let price = position.liquidation_price?;

    let report = DataValidator::validate_position(
        &position.coin,
        position.notional_value,
        position.leverage,
        price,
        0.0,
    );
    if !report.log() {
        return None;
    }

    Some(LiquidationLevel {
        coin: position.coin.clone(),
        side: if position.is_long() {
            Side::Long
        } else {
            Side::Short
        },
        price,
        size_usd: position.notional_value,
        leverage: position.leverage,
        wallet: position.wallet.clone(),
    })
}
