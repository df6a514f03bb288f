use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use db::{create_pool, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "db=info,repo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = DbConfig::from_env();
    tracing::info!(
        "Checking database (pool {}..{} connections, log level {})",
        config.min_connections,
        config.max_connections,
        config.log_level
    );

    let pool = create_pool(&config).await?;
    tracing::info!("Database reachable, {} connections open", pool.size());

    pool.close().await;
    Ok(())
}
