//! Collection orchestrator: drives one cycle from wallet refresh through
//! snapshot persistence, and the continuous loop around it.

use anyhow::{Context, Result};
use chrono::Utc;
use liqmap_core::config::AppConfig;
use liqmap_data::models::LiquidationMap;
use liqmap_data::HistoricalStore;
use liqmap_hyperliquid::{HyperliquidClient, TradeStream};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::aggregator::LiquidationAggregator;
use crate::scanner::PositionScanner;
use crate::wallets::WalletRegistry;

/// How many assets the bootstrap backfill covers.
const BOOTSTRAP_ASSETS: usize = 10;
/// Pause after a failed cycle before the next attempt.
const ERROR_PAUSE: Duration = Duration::from_secs(30);

pub struct Collector {
    config: AppConfig,
    client: Arc<HyperliquidClient>,
    store: HistoricalStore,
    registry: WalletRegistry,
    scanner: PositionScanner,
    aggregator: LiquidationAggregator,
    discovered: Option<mpsc::Receiver<String>>,
}

impl Collector {
    /// Builds the pipeline around one shared client, loading the wallet
    /// registry from disk.
    ///
    /// # Errors
    /// Returns an error if an existing wallet file cannot be parsed.
    pub fn new(config: AppConfig, store: HistoricalStore) -> Result<Self> {
        let client = Arc::new(HyperliquidClient::new(&config.api));
        let registry = WalletRegistry::load(&config.storage.wallet_file)?;
        let scanner = PositionScanner::new(
            client.clone(),
            &config.scan,
            config.api.requests_per_second as usize,
        );
        let aggregator = LiquidationAggregator::new(&config.map);

        Ok(Self {
            config,
            client,
            store,
            registry,
            scanner,
            aggregator,
            discovered: None,
        })
    }

    /// Spawns the trade-stream listener; its addresses are drained into
    /// the registry at the start of each cycle, keeping a single writer.
    #[must_use]
    pub fn with_discovery(mut self) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        let mut stream = TradeStream::new(
            self.config.api.ws_url.clone(),
            self.config.assets.clone(),
            tx,
        );
        tokio::spawn(async move {
            if let Err(e) = stream.run().await {
                tracing::error!("trade stream terminated: {}", e);
            }
        });
        self.discovered = Some(rx);
        self
    }

    fn drain_discovered(&mut self) {
        let Some(rx) = self.discovered.as_mut() else {
            return;
        };
        let mut new_count = 0;
        while let Ok(address) = rx.try_recv() {
            if self.registry.add(&address) {
                new_count += 1;
            }
        }
        if new_count > 0 {
            tracing::info!("{} wallets discovered via trade stream", new_count);
        }
    }

    /// Runs one collection cycle. Returns the number of assets mapped.
    ///
    /// # Errors
    /// Returns an error on scan, price, or persistence failure; the
    /// continuous loop turns that into a pause and retry.
    pub async fn run_cycle(&mut self) -> Result<usize> {
        let timestamp = Utc::now();
        tracing::info!("starting collection cycle");

        self.drain_discovered();

        if self.registry.len() < self.config.scan.bootstrap_wallet_floor {
            let bootstrap: Vec<String> = self
                .config
                .assets
                .iter()
                .take(BOOTSTRAP_ASSETS)
                .cloned()
                .collect();
            self.registry.backfill(&self.client, &bootstrap).await;
            self.registry.save(&self.config.storage.wallet_file)?;
        }

        let wallets = self
            .registry
            .query(1, self.config.scan.wallet_max_age_hours);

        let scan = self.scanner.scan(&wallets).await?;
        let prices = self.client.all_mids().await?;

        let maps = self
            .aggregator
            .build_maps(&scan.liquidation_levels, &prices);

        write_latest_maps(&self.config.storage.map_file, &maps)?;
        self.store.insert_snapshots(&maps, timestamp).await?;
        self.store.insert_prices(&prices, timestamp).await?;

        tracing::info!(
            "cycle complete: {} assets mapped from {} levels ({} scan errors)",
            maps.len(),
            scan.liquidation_levels.len(),
            scan.errors
        );
        Ok(maps.len())
    }

    /// Runs cycles on a fixed cadence until Ctrl-C. A failed cycle logs
    /// and pauses before the next attempt.
    ///
    /// # Errors
    /// Returns an error only if the final registry save fails.
    pub async fn run_continuous(&mut self, interval: Duration) -> Result<()> {
        tracing::info!(
            "continuous collection every {}s, Ctrl-C to stop",
            interval.as_secs()
        );
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                result = self.run_cycle() => {
                    let pause = match result {
                        Ok(_) => {
                            cycles += 1;
                            tracing::info!("cycle #{} done, next in {}s", cycles, interval.as_secs());
                            interval
                        }
                        Err(e) => {
                            tracing::error!("cycle failed: {:#}", e);
                            ERROR_PAUSE
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        () = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        tracing::info!("shutting down after {} cycles", cycles);
        self.registry.save(&self.config.storage.wallet_file)
    }
}

/// Writes the latest-snapshot file the dashboard reads: a JSON object
/// keyed by asset in the wire shape of `LiquidationMap`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_latest_maps(path: &str, maps: &HashMap<String, LiquidationMap>) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(maps).context("serializing liquidation maps")?;
    std::fs::write(path, json).with_context(|| format!("writing map file {path}"))?;
    tracing::info!("saved maps for {} assets to {}", maps.len(), path);
    Ok(())
}
