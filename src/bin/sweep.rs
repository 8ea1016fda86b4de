use clap::Parser;
use imagegate::config::ImageGateConfig;
use imagegate::storage::DiskStorage;
use imagegate::sweep::sweep_cache;
use std::path::PathBuf;

/// Remove cached renditions older than a number of days.
#[derive(Parser, Debug)]
#[command(name = "imagegate-sweep", version)]
struct Cli {
    /// Age threshold in days; 0 wipes the entire cache.
    /// Defaults to the configured cache lifetime.
    #[arg(long)]
    days: Option<u32>,

    /// Cache root to sweep.
    #[arg(long, env = "IMAGEGATE_CACHE_ROOT")]
    cache_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagegate=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = ImageGateConfig::from_env();
    let cache_root = cli.cache_root.unwrap_or_else(|| cfg.cache_root.clone());
    let days = cli.days.unwrap_or(cfg.cache_lifetime_days);

    if days > 0 {
        println!("Cleaning image cache older than {} days...", days);
    } else {
        println!("Cleaning the entire image cache...");
    }

    let storage = DiskStorage::new(cfg.public_root.clone(), cfg.private_root.clone());
    let report = sweep_cache(&storage, &cache_root, days).await?;

    println!(
        "Deleted {} of {} cached images.",
        report.deleted, report.scanned
    );
    Ok(())
}
