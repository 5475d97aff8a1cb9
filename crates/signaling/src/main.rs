use signaling_server::{run_server, SignalingServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = SignalingServerConfig::from_env()?;
    info!(
        listen_addr = %config.listen_addr,
        keepalive_secs = config.keepalive_timeout.as_secs(),
        max_clients = config.max_clients,
        "Relay configured"
    );
    run_server(config).await
}
