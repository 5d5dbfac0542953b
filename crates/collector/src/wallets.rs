//! Registry of observed trading addresses.
//!
//! Addresses arrive from the trade websocket and from recent-trades
//! backfills. The registry is owned by the orchestrator; other producers
//! hand addresses over a channel so there is a single writer.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use liqmap_hyperliquid::{HyperliquidClient, Trade};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WalletEntry {
    pub last_seen: DateTime<Utc>,
    pub trade_count: u64,
}

/// On-disk shape of `data/wallets.json`.
#[derive(Debug, Serialize, Deserialize)]
struct WalletFile {
    wallets: Vec<String>,
    last_seen: HashMap<String, DateTime<Utc>>,
    trade_counts: HashMap<String, u64>,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct WalletRegistry {
    wallets: HashMap<String, WalletEntry>,
}

impl WalletRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an address (canonicalized to lowercase), refreshing last-seen
    /// and incrementing the trade count. Returns true if previously
    /// absent.
    pub fn add(&mut self, address: &str) -> bool {
        let address = address.to_lowercase();
        let now = Utc::now();

        match self.wallets.get_mut(&address) {
            Some(entry) => {
                entry.last_seen = now;
                entry.trade_count += 1;
                false
            }
            None => {
                self.wallets.insert(
                    address,
                    WalletEntry {
                        last_seen: now,
                        trade_count: 1,
                    },
                );
                true
            }
        }
    }

    /// Feeds every counterparty of a trade batch into the registry.
    /// Returns the number of newly observed wallets.
    pub fn observe_trades(&mut self, trades: &[Trade]) -> usize {
        let mut new_count = 0;
        for trade in trades {
            for user in &trade.users {
                if self.add(user) {
                    new_count += 1;
                }
            }
        }
        new_count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Wallets with at least `min_trades` trades seen within
    /// `max_age_hours`.
    #[must_use]
    pub fn query(&self, min_trades: u64, max_age_hours: i64) -> HashSet<String> {
        self.query_at(min_trades, max_age_hours, Utc::now())
    }

    fn query_at(&self, min_trades: u64, max_age_hours: i64, now: DateTime<Utc>) -> HashSet<String> {
        let cutoff = now - Duration::hours(max_age_hours);
        self.wallets
            .iter()
            .filter(|(_, entry)| entry.trade_count >= min_trades && entry.last_seen > cutoff)
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Pulls recent trades for each asset and absorbs the counterparty
    /// addresses. Per-asset failures are logged and skipped.
    pub async fn backfill(&mut self, client: &HyperliquidClient, assets: &[String]) {
        tracing::info!("backfilling wallets from {} assets", assets.len());

        for coin in assets {
            match client.recent_trades(coin).await {
                Ok(trades) => {
                    let new_count = self.observe_trades(&trades);
                    if new_count > 0 {
                        tracing::debug!("{}: +{} wallets", coin, new_count);
                    }
                }
                Err(e) => tracing::warn!("{}: backfill failed: {}", coin, e),
            }
        }

        tracing::info!("registry holds {} wallets after backfill", self.len());
    }

    /// Persists the registry as a JSON document.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
        }

        let file = WalletFile {
            wallets: self.wallets.keys().cloned().collect(),
            last_seen: self
                .wallets
                .iter()
                .map(|(address, entry)| (address.clone(), entry.last_seen))
                .collect(),
            trade_counts: self
                .wallets
                .iter()
                .map(|(address, entry)| (address.clone(), entry.trade_count))
                .collect(),
            saved_at: Utc::now(),
        };

        let json = serde_json::to_string(&file).context("serializing wallet registry")?;
        std::fs::write(path, json).with_context(|| format!("writing wallet file {path}"))?;
        tracing::info!("saved {} wallets to {}", self.wallets.len(), path);
        Ok(())
    }

    /// Loads the registry from disk. A missing file yields an empty
    /// registry.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be parsed.
    pub fn load(path: &str) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no wallet file at {}, starting empty", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(e).with_context(|| format!("reading wallet file {path}")),
        };

        let file: WalletFile =
            serde_json::from_str(&raw).with_context(|| format!("parsing wallet file {path}"))?;

        let mut wallets = HashMap::with_capacity(file.wallets.len());
        for address in file.wallets {
            let entry = WalletEntry {
                last_seen: file
                    .last_seen
                    .get(&address)
                    .copied()
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                trade_count: file.trade_counts.get(&address).copied().unwrap_or(0),
            };
            wallets.insert(address, entry);
        }

        tracing::info!("loaded {} wallets from {}", wallets.len(), path);
        Ok(Self { wallets })
    }
}
