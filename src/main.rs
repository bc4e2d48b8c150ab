use phonebook::{config::Config, server};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;
    server::run(config).await?;
    Ok(())
}
