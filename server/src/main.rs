use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use hivemind_relay::config::{generate_config_template, Cli, Config};
use hivemind_relay::routes;
use hivemind_relay::state::AppState;
use hivemind_relay::ws::protocol::InboundEvent;
use hivemind_relay::ws::{ConnectionRegistry, CLOSE_GOING_AWAY};

/// How long to wait for sessions to unregister after the shutdown close frames.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    init_tracing(config.json_logs);

    tracing::info!(
        "HiveMind relay v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let registry = Arc::new(ConnectionRegistry::new());

    // Inbound messages the relay does not handle are handed to this queue.
    // Persistence collaborators consume it; without one they are only logged.
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundEvent>();
    tokio::spawn(consume_inbound_events(inbound_rx));

    if config.close_superseded {
        tracing::info!("Superseded channels will be closed on re-registration");
    }

    let app_state = AppState {
        registry: registry.clone(),
        inbound_tx,
        close_superseded: config.close_superseded,
        max_message_bytes: config.max_message_bytes,
        api_token: config.api_token.clone(),
    };

    let app = routes::build_router(app_state);

    let addr = config.listen_address();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(registry.clone()))
    .await?;

    drain_connections(&registry).await;
    tracing::info!("HiveMind relay stopped");

    Ok(())
}

fn init_tracing(json_logs: bool) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hivemind_relay=info"))
    };

    if json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter()).init();
    }
}

/// Resolve on ctrl-c, after asking every registered channel to close.
async fn shutdown_signal(registry: Arc<ConnectionRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    let closing = registry.close_all(CLOSE_GOING_AWAY, "server shutting down");
    tracing::info!(channels = closing, "Shutdown requested, closing channels");
}

/// Give sessions a bounded window to flush their close frames and unregister.
async fn drain_connections(registry: &ConnectionRegistry) {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    while !registry.is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !registry.is_empty() {
        tracing::warn!(
            remaining = registry.len(),
            "Channels still registered at shutdown"
        );
    }
}

/// Default consumer for inbound passthrough messages.
async fn consume_inbound_events(mut rx: mpsc::UnboundedReceiver<InboundEvent>) {
    while let Some(event) = rx.recv().await {
        tracing::debug!(
            connection_id = %event.connection_id,
            user_id = ?event.user_id,
            kind = %event.payload.kind(),
            "Inbound message received"
        );
    }
}
