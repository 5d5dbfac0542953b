use clap::{Parser, Subcommand};
use liqmap_collector::Collector;
use liqmap_core::ConfigLoader;
use liqmap_data::{export_snapshots_csv, migrate_compress, run_maintenance, HistoricalStore};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "liqmap")]
#[command(about = "Hyperliquid liquidation map collector", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collection cycles
    Collect {
        /// Keep collecting on a fixed cadence instead of running once
        #[arg(long)]
        continuous: bool,
        /// Override the cadence in seconds
        #[arg(long)]
        interval: Option<u64>,
        /// Also discover wallets from the trade websocket
        #[arg(long)]
        discover: bool,
    },
    /// Apply the tiered retention policy to the historical store
    Maintain {
        /// Report what would be deleted without mutating
        #[arg(long)]
        dry_run: bool,
    },
    /// Compress legacy uncompressed cluster blobs
    MigrateCompress {
        /// Report candidates without rewriting
        #[arg(long)]
        dry_run: bool,
        /// Rows per batch
        #[arg(long, default_value_t = 1000)]
        batch_size: i64,
    },
    /// Fetch market data once and write the market data file
    Market {
        /// Also pull order-book liquidity for the top assets
        #[arg(long)]
        liquidity: bool,
    },
    /// Export an asset's snapshot summaries to CSV
    Export {
        /// Asset symbol (e.g. "BTC")
        #[arg(long)]
        asset: String,
        /// Output CSV path
        #[arg(short, long)]
        output: String,
    },
    /// Show historical store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load_from(&cli.config)?;

    match cli.command {
        Commands::Collect {
            continuous,
            interval,
            discover,
        } => {
            let store = HistoricalStore::open(&config.storage.db_path).await?;
            let interval =
                Duration::from_secs(interval.unwrap_or(config.scan.interval_secs));

            let mut collector = Collector::new(config, store)?;
            if discover {
                collector = collector.with_discovery();
            }

            if continuous {
                collector.run_continuous(interval).await?;
            } else {
                let assets = collector.run_cycle().await?;
                tracing::info!("collected maps for {} assets", assets);
            }
        }
        Commands::Maintain { dry_run } => {
            let store = HistoricalStore::open(&config.storage.db_path).await?;
            let report = run_maintenance(&store, dry_run).await?;

            println!(
                "{}: snapshots expired {}, daily downsample {}, hourly downsample {}",
                if dry_run { "dry-run" } else { "maintenance" },
                report.snapshots_expired,
                report.snapshots_downsampled_daily,
                report.snapshots_downsampled_hourly,
            );
            println!(
                "price history: expired {}, daily {}, hourly {} (total {} rows)",
                report.prices_expired,
                report.prices_downsampled_daily,
                report.prices_downsampled_hourly,
                report.total_deleted(),
            );
        }
        Commands::MigrateCompress {
            dry_run,
            batch_size,
        } => {
            let store = HistoricalStore::open(&config.storage.db_path).await?;
            let report = migrate_compress(&store, dry_run, batch_size).await?;

            println!(
                "{} rows total, {} already compressed, {} candidates",
                report.total_rows, report.already_compressed, report.candidates,
            );
            if !dry_run {
                println!("{} rewritten, {} errors", report.rewritten, report.errors);
            }
        }
        Commands::Market { liquidity } => {
            let client = std::sync::Arc::new(liqmap_hyperliquid::HyperliquidClient::new(
                &config.api,
            ));
            let fetcher = liqmap_collector::MarketDataFetcher::new(client);
            let data = fetcher.fetch_all(liquidity).await?;
            liqmap_collector::write_market_file(&config.storage.market_file, &data)?;
            println!(
                "wrote market data for {} assets to {}",
                data.len(),
                config.storage.market_file
            );
        }
        Commands::Export { asset, output } => {
            let store = HistoricalStore::open(&config.storage.db_path).await?;
            let count = export_snapshots_csv(&store, &asset, &output).await?;
            println!("exported {count} snapshots for {asset} to {output}");
        }
        Commands::Stats => {
            let store = HistoricalStore::open(&config.storage.db_path).await?;
            let stats = store.stats().await?;

            println!("snapshots: {}", stats.snapshot_count);
            println!("price records: {}", stats.price_count);
            println!("liquidation events: {}", stats.event_count);
            println!("assets tracked: {}", stats.assets_tracked);
            if let (Some(oldest), Some(newest)) = (stats.oldest_snapshot, stats.newest_snapshot) {
                println!("range: {oldest} to {newest}");
            }
        }
    }

    Ok(())
}
