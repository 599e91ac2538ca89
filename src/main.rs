use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use tradegate::{gate, CliArgs, Config, GateState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli_args = CliArgs::parse();

    // Load config with precedence: CLI > env > file > defaults
    let config = Config::load(&cli_args)?;

    // Initialize tracing with configured log level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("🚦 TradeGate starting...");
    tracing::info!("📡 Upstream URL: {}", config.upstream_url);
    tracing::info!("🔑 Auth service URL: {}", config.auth_service_url);

    let state = Arc::new(GateState::from_config(&config));
    tracing::info!(
        gate_id = %state.gate_id,
        fail_open = config.fail_open,
        flag_threshold = config.flag_threshold,
        "Gate state initialized"
    );

    let app = gate::router(state);

    tracing::info!("🚦 TradeGate listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
