use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use parley_server::config::{generate_config_template, Config};
use parley_server::gateway::SqliteGateway;
use parley_server::state::{AppState, RuntimeSettings};
use parley_server::{db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter)
            .init();
    }

    tracing::info!("Parley server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database
    let db = db::init_db(&config.data_dir)?;
    let gateway = Arc::new(SqliteGateway::new(db, config.gateway_timeout()));

    // Nobody is connected yet; clear flags left behind by an unclean shutdown
    let stale = gateway.reset_online().await?;
    if stale > 0 {
        tracing::info!("Cleared online flag for {} users", stale);
    }

    let app_state = AppState::new(gateway, RuntimeSettings::from(&config));
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
