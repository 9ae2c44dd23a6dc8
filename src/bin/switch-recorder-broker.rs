use busrt::broker::{Broker, ServerConfig};
use switch_recorder::AppConfig;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| AppConfig::default().bus_address);

    let mut broker = Broker::new();
    let config = ServerConfig::default().buf_ttl(std::time::Duration::from_millis(100));
    broker.spawn_tcp_server(&address, config).await?;

    tracing::info!(address = %address, "broker started");

    signal::ctrl_c().await?;
    tracing::info!("broker shutting down");

    Ok(())
}
