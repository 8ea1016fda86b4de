use imagegate::config::ImageGateConfig;
use imagegate::router;
use std::net::SocketAddr;

/// Imagegate standalone server entry point.
///
/// Initializes tracing, validates configuration, and starts the HTTP server
/// answering image transformation requests under the configured prefix.
///
/// # Configuration
/// Environment variables:
/// - `IMAGEGATE_PREFIX`: route prefix (default: "img")
/// - `IMAGEGATE_PUBLIC_ROOT` / `IMAGEGATE_PRIVATE_ROOT`: storage backend roots
/// - `IMAGEGATE_CACHE_ROOT`: rendition cache directory
/// - `IMAGEGATE_CACHE_DAYS`: cache lifetime consumed by `imagegate-sweep`
/// - `PORT`: HTTP listen port (default: 8080)
/// - `RUST_LOG`: logging verbosity
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with environment-based filtering
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagegate=debug,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting imagegate server");

    let cfg = ImageGateConfig::from_env();
    cfg.validate()?;

    let app = router(cfg);

    // Cloud platforms inject PORT
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    // Bind to 0.0.0.0 for containerized deployment
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
