use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Assets whose trade streams and maps are tracked.
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_url: String,
    pub ws_url: String,
    /// Concurrent request cap; also the scanner batch size.
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Continuous-mode cadence.
    pub interval_secs: u64,
    pub max_wallets: usize,
    /// Positions below this notional never propagate downstream.
    pub min_position_usd: f64,
    /// Registry floor below which a backfill runs before scanning.
    pub bootstrap_wallet_floor: usize,
    pub wallet_max_age_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Bucket width as a percentage of the current price.
    pub bucket_percent: f64,
    /// Significance threshold for nearest-cluster selection and merging.
    pub min_cluster_size_usd: f64,
    /// Maximum gap between two insignificant clusters that still merges.
    pub merge_gap_percent: f64,
    /// Raw dust floor below which a bucket never becomes a cluster.
    pub cluster_floor_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub wallet_file: String,
    pub map_file: String,
    pub market_file: String,
    pub db_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.hyperliquid.xyz".to_string(),
            ws_url: "wss://api.hyperliquid.xyz/ws".to_string(),
            requests_per_second: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_wallets: 5000,
            min_position_usd: 1000.0,
            bootstrap_wallet_floor: 50,
            wallet_max_age_hours: 24,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            bucket_percent: 0.1,
            min_cluster_size_usd: 100_000.0,
            merge_gap_percent: 0.5,
            cluster_floor_usd: 10_000.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            wallet_file: "data/wallets.json".to_string(),
            map_file: "data/liquidation_map.json".to_string(),
            market_file: "data/market_data.json".to_string(),
            db_path: "data/historical.db".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            scan: ScanConfig::default(),
            map: MapConfig::default(),
            storage: StorageConfig::default(),
            assets: default_assets(),
        }
    }
}

fn default_assets() -> Vec<String> {
    [
        "BTC", "ETH", "SOL", "ARB", "DOGE", "SUI", "AVAX", "LINK", "OP", "APT", "INJ", "TIA",
        "SEI", "WLD", "HYPE", "XRP", "FARTCOIN", "PEPE", "WIF", "BONK",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_collector_constants() {
        let config = AppConfig::default();

        assert_eq!(config.api.requests_per_second, 10);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.scan.interval_secs, 300);
        assert_eq!(config.scan.max_wallets, 5000);
        assert!((config.scan.min_position_usd - 1000.0).abs() < f64::EPSILON);
        assert!((config.map.bucket_percent - 0.1).abs() < f64::EPSILON);
        assert!((config.map.min_cluster_size_usd - 100_000.0).abs() < f64::EPSILON);
        assert!((config.map.merge_gap_percent - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.storage.db_path, "data/historical.db");
        assert_eq!(config.assets.len(), 20);
        assert_eq!(config.assets[0], "BTC");
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.api.api_url, config.api.api_url);
        assert_eq!(back.scan.max_wallets, config.scan.max_wallets);
        assert_eq!(back.assets, config.assets);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{"assets": ["BTC", "ETH"]}"#).unwrap();

        assert_eq!(parsed.assets, vec!["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(parsed.api.requests_per_second, 10);
        assert_eq!(parsed.scan.interval_secs, 300);
    }
}
